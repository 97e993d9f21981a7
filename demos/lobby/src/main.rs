use std::time::Duration;

use scaffolding::prelude::*;

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

const USAGE: &str = "\
usage:
  lobby host <room-code|-> <game-port>
  lobby join <room-code>
  lobby gen-code

environment:
  SCAFFOLDING_PLAYER        player name (default: Player)
  SCAFFOLDING_EASYTIER_CORE path to easytier-core (default: easytier-core)
  SCAFFOLDING_EASYTIER_CLI  path to easytier-cli (default: easytier-cli)
  RUST_LOG                  log filter (default: info)";

const VENDOR: &str = concat!("scaffolding-lobby ", env!("CARGO_PKG_VERSION"));

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, PartialEq, Eq)]
enum Command {
    /// `None` generates a fresh code.
    Host { code: Option<String>, game_port: u16 },
    Join { code: String },
    GenCode,
}

fn parse_args(args: &[String]) -> Result<Command, String> {
    match args {
        [cmd, code, port] if cmd == "host" => {
            let game_port = port
                .parse()
                .map_err(|_| format!("invalid game port: {port}"))?;
            let code = (code != "-").then(|| code.clone());
            Ok(Command::Host { code, game_port })
        }
        [cmd, code] if cmd == "join" => Ok(Command::Join { code: code.clone() }),
        [cmd] if cmd == "gen-code" => Ok(Command::GenCode),
        _ => Err(USAGE.to_owned()),
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn easytier() -> EasyTier {
    EasyTier::new(
        env_or("SCAFFOLDING_EASYTIER_CORE", "easytier-core"),
        env_or("SCAFFOLDING_EASYTIER_CLI", "easytier-cli"),
    )
}

fn player(kind: MemberKind) -> Member {
    Member::new(env_or("SCAFFOLDING_PLAYER", "Player"), machine_id(), VENDOR, kind)
}

// ---------------------------------------------------------------------------
// Host / join
// ---------------------------------------------------------------------------

async fn host(code: Option<String>, game_port: u16) -> Result<(), ScaffoldingError> {
    let code = match code {
        Some(code) => RoomCode::parse(&code)?,
        None => RoomCode::generate(),
    };

    let server = ServerBuilder::new()
        .host(player(MemberKind::Host))
        .server_port(game_port)
        .bind(easytier())
        .await?;
    server.create_room(&code).await?;

    println!("room code: {code}");
    println!("lobby listening on port {}", server.port());

    let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                let room = server.room().await;
                let names: Vec<_> = room.members().iter().map(Member::name).collect();
                tracing::info!(members = ?names, "roster");
            }
        }
    }

    server.stop().await
}

async fn join(code: String) -> Result<(), ScaffoldingError> {
    let mut client = Client::new(
        easytier(),
        player(MemberKind::Guest),
        code,
        ClientConfig::default(),
    );
    client.connect().await?;

    if let Some(port) = client.local_game_port() {
        println!("game server available at 127.0.0.1:{port}");
    }

    let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
    let result = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break Ok(()),
            _ = ticker.tick() => {
                match client.heartbeat().await {
                    Ok(()) => {
                        let names: Vec<_> =
                            client.room().members().iter().map(Member::name).collect();
                        tracing::info!(members = ?names, "roster");
                    }
                    Err(ScaffoldingError::RoomClosed) => {
                        println!("the host closed the room");
                        break Ok(());
                    }
                    Err(e) if e.is_timeout() => tracing::warn!(error = %e, "heartbeat timed out"),
                    Err(e) => break Err(e),
                }
            }
        }
    };

    client.stop().await?;
    result
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match parse_args(&args)? {
        Command::Host { code, game_port } => host(code, game_port).await?,
        Command::Join { code } => join(code).await?,
        Command::GenCode => println!("{}", RoomCode::generate()),
    }
    Ok(())
}
