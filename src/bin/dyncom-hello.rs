//! Provides the `dyncom-hello` demo: registers the Hello class, creates an
//! instance through the broker and calls `Hello` through its vtable.
//!
//! # Examples
//! ```text
//! dyncom-hello
//! dyncom-hello --broker ole32 --repeat 3
//! RUST_LOG=dyncom=trace dyncom-hello --config hello.json
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use dyncom::hello::{hello_factory_with_policies, Greeter, HelloClient, CLSID_HELLO, IID_HELLO};
use dyncom::registry::{ClassRegistry, InProcessBroker, ObjectBroker};
use dyncom::ServerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BrokerKind {
    /// Process-local class table, available everywhere.
    InProcess,
    /// The platform COM runtime (Windows only).
    Ole32,
}

#[derive(Parser)]
#[command(name = "dyncom-hello")]
#[command(about = "Registers the Hello class and greets through its vtable")]
struct Args {
    /// JSON server configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Broker used for registration and creation
    #[arg(short, long, value_enum, default_value = "in-process")]
    broker: BrokerKind,

    /// Number of Hello calls
    #[arg(short, long, default_value = "1")]
    repeat: u32,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => ServerConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => ServerConfig::default(),
    };

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log_filter))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("dyncom-hello v{}", env!("CARGO_PKG_VERSION"));

    let registry = ClassRegistry::new(make_broker(args.broker, &config)?);
    let greeter = Greeter::stdout();
    let factory = hello_factory_with_policies(greeter.clone(), config.factory, config.instances);

    registry
        .register(&factory, config.class_context, config.registration_flags)
        .context("registering the Hello class")?;

    {
        let object = registry
            .create_instance(&CLSID_HELLO, &IID_HELLO, config.class_context)
            .context("creating a Hello instance")?;
        let hello = HelloClient::query(&object)?;
        for _ in 0..args.repeat {
            hello.hello().context("calling Hello")?;
        }
    }

    registry.revoke(&CLSID_HELLO)?;
    tracing::info!(
        greetings = greeter.greetings(),
        instances = factory.instances_created(),
        live_objects = dyncom::handle::live_objects(),
        "done"
    );
    Ok(())
}

fn make_broker(kind: BrokerKind, config: &ServerConfig) -> Result<Box<dyn ObjectBroker>> {
    match kind {
        BrokerKind::InProcess => Ok(Box::new(InProcessBroker::new())),
        #[cfg(windows)]
        BrokerKind::Ole32 => {
            let broker = dyncom::registry::Ole32Broker::initialize(config.apartment.coinit())
                .context("initializing COM")?;
            Ok(Box::new(broker))
        }
        #[cfg(not(windows))]
        BrokerKind::Ole32 => {
            let _ = config;
            anyhow::bail!("the ole32 broker is only available on Windows")
        }
    }
}
