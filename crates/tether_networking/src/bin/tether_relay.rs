//! # TETHER Relay Server
//!
//! WebSocket relay that owns rooms and host election for `WsTransport`
//! clients.
//!
//! ## Usage
//!
//! ```bash
//! tether_relay --bind 0.0.0.0:7878
//! ```

use tether_networking::{RelayServer, DEFAULT_RELAY_PORT};

fn main() {
    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║         TETHER RELAY                                             ║");
    println!("║         ROOMS, HOSTS AND ROUTING                                 ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();

    // Parse command line arguments (simple parsing, no external deps)
    let args: Vec<String> = std::env::args().collect();
    let mut bind = format!("0.0.0.0:{DEFAULT_RELAY_PORT}");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" | "-b" => {
                if i + 1 < args.len() {
                    bind.clone_from(&args[i + 1]);
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Usage: tether_relay [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -b, --bind <ADDR>    Address to listen on (default: 0.0.0.0:{DEFAULT_RELAY_PORT})");
                println!("  -h, --help           Show this help");
                return;
            }
            other => eprintln!("ignoring unknown argument: {other}"),
        }
        i += 1;
    }

    tracing_subscriber::fmt::init();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("failed to start async runtime: {err}");
            std::process::exit(1);
        }
    };

    let result = runtime.block_on(async {
        let server = RelayServer::bind(bind.as_str()).await?;
        if let Ok(addr) = server.local_addr() {
            println!("Listening on ws://{addr}");
        }
        server.run().await
    });

    if let Err(err) = result {
        eprintln!("relay stopped: {err}");
        std::process::exit(1);
    }
}
