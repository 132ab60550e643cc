use clap::Parser;
use log::info;
use server::config::ServerConfig;
use server::network::Server;
use std::time::Duration;

/// Authoritative room server for rumble and slimevolley.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "2567")]
    port: u16,
    /// Tick rate (simulation steps per second)
    #[clap(short, long, default_value = "60")]
    tick_rate: u32,
    /// Maximum concurrent connections
    #[clap(short, long, default_value = "256")]
    max_clients: usize,
    /// Seconds an empty room stays open
    #[clap(long, default_value = "30")]
    empty_room_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = ServerConfig {
        listen_addr: format!("{}:{}", args.host, args.port),
        max_clients: args.max_clients,
        tick_rate_hz: args.tick_rate.max(1),
        empty_room_timeout: Duration::from_secs(args.empty_room_timeout),
        ..ServerConfig::default()
    };

    let server = Server::new(config).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
