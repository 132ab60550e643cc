use clap::Parser;
use client::network::{Client, Connection};
use log::info;
use shared::{Command, RoomKind, SessionId};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server WebSocket URL
    #[arg(short = 's', long, default_value = "ws://127.0.0.1:2567")]
    server: String,

    /// Create a room of this type (rumble or slimevolley)
    #[arg(short = 'c', long, conflicts_with = "join")]
    create: Option<RoomKind>,

    /// Join an existing room by id
    #[arg(short = 'j', long)]
    join: Option<String>,

    /// Resume a session inside its grace window (requires --join)
    #[arg(long, requires = "join")]
    session: Option<SessionId>,

    /// Display name sent after joining
    #[arg(short = 'n', long)]
    name: Option<String>,

    /// Color sent after joining
    #[arg(long)]
    color: Option<String>,

    /// Mark ready right after joining
    #[arg(short = 'r', long)]
    ready: bool,

    /// Simulate network latency in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut connection = Connection::connect(&args.server).await?;
    if args.fake_ping > 0 {
        info!("Simulating {}ms latency", args.fake_ping);
        connection.set_fake_ping(args.fake_ping);
    }

    let joined = match (args.create, args.join.as_deref(), args.session) {
        (Some(kind), _, _) => connection.create(kind).await?,
        (None, Some(room_id), Some(session_id)) => {
            connection.reconnect(room_id, session_id).await?
        }
        (None, Some(room_id), None) => connection.join(room_id).await?,
        (None, None, _) => return Err("either --create or --join is required".into()),
    };
    info!(
        "Joined {} room {} as session {}",
        joined.kind, joined.room_id, joined.session_id
    );

    let mut client = Client::new(connection, joined);
    if let Some(name) = args.name {
        client.command(Command::SetName(name)).await?;
    }
    if let Some(color) = args.color {
        client.command(Command::SetColor(color)).await?;
    }
    if args.ready {
        client.command(Command::SetReady(true)).await?;
    }

    info!("Type commands: ready, start, status, quit, ...");
    client.run().await?;

    Ok(())
}
