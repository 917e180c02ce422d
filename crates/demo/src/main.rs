use std::net::SocketAddr;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use clap::Parser;

use lockstep::{
    ClientConfig, DatagramTransport, MAX_LOCAL_PARTICIPANTS, Realize, RealizeState, UdpTransport,
};

const LOG_TARGET: &str = "lockstep_demo";

#[derive(Parser)]
#[command(name = "lockstep-demo")]
#[command(about = "Console client for a lock-step game server")]
struct Args {
    #[arg(
        short,
        long,
        default_value = "127.0.0.1:27000",
        help = "Server address to connect to"
    )]
    server: String,

    #[arg(short, long, default_value = "0.0.0.0:0")]
    bind: String,

    #[arg(short, long, default_value_t = 16, help = "Tick duration in ms")]
    tick_ms: u64,

    #[arg(short, long, default_value_t = 1, help = "Number of local participants")]
    participants: u8,

    #[arg(long, help = "Ask the server for debug streams")]
    debug_streams: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();
    if args.participants == 0 || args.participants as usize > MAX_LOCAL_PARTICIPANTS {
        bail!(
            "participant count must be between 1 and {}",
            MAX_LOCAL_PARTICIPANTS
        );
    }

    let server_addr: SocketAddr = args
        .server
        .parse()
        .with_context(|| format!("invalid server address {}", args.server))?;
    let transport = UdpTransport::connect(args.bind.as_str(), server_addr)?;
    log::info!(
        target: LOG_TARGET,
        "bound {} talking to {}",
        transport.local_addr(),
        transport.remote_addr()
    );

    let config = ClientConfig {
        max_participants: args.participants as usize,
        expected_tick_duration_ms: args.tick_ms,
        wants_debug_streams: args.debug_streams,
        ..Default::default()
    };

    let mut realize = Realize::new(config, transport);
    realize.join_game((0..args.participants).collect());

    run(&mut realize, args.tick_ms.max(1))
}

fn run<T: DatagramTransport>(realize: &mut Realize<T>, tick_ms: u64) -> anyhow::Result<()> {
    let started = Instant::now();
    let tick = Duration::from_millis(tick_ms);
    let mut frame: u32 = 0;

    loop {
        let tick_started = Instant::now();
        let now_ms = started.elapsed().as_millis() as u64;

        // Connected UDP sockets report ICMP refusals on the next call; keep ticking through them.
        if let Err(err) = realize.update(now_ms) {
            if !err.is_transport() {
                return Err(err.into());
            }
            log::warn!(target: LOG_TARGET, "transport error, retrying next tick: {}", err);
        }

        match realize.state() {
            RealizeState::Disconnected => {
                log::warn!(target: LOG_TARGET, "disconnected, stopping");
                return Ok(());
            }
            RealizeState::Synced => {
                predict(realize, frame)?;
                frame = frame.wrapping_add(1);
                drain_authoritative(realize);
            }
            _ => {}
        }

        if let Some(remaining) = tick.checked_sub(tick_started.elapsed()) {
            thread::sleep(remaining);
        }
    }
}

/// Writes a dummy input for every local participant unless prediction is already far enough ahead.
fn predict<T: DatagramTransport>(realize: &mut Realize<T>, frame: u32) -> anyhow::Result<()> {
    let session = realize.session_mut();

    let next_id = session.predicted_steps().expected_write_id();
    if let Some(optimal) = session.optimal_step_id_to_send() {
        if next_id > optimal {
            log::trace!(
                target: LOG_TARGET,
                "predicted {:08X} is ahead of {:08X}, skipping",
                next_id,
                optimal
            );
            return Ok(());
        }
    }
    if !session.can_write_predicted_step() {
        log::debug!(target: LOG_TARGET, "predicted step buffer is full");
        return Ok(());
    }

    let mut payload = Vec::new();
    for entry in session.participants() {
        payload.push(entry.participant_id);
        payload.push(4);
        payload.extend_from_slice(&frame.to_le_bytes());
    }
    session.write_predicted_step(&payload)?;

    Ok(())
}

fn drain_authoritative<T: DatagramTransport>(realize: &mut Realize<T>) {
    let session = realize.session_mut();
    while let Some((id, payload)) = session.read_authoritative_step() {
        log::info!(
            target: LOG_TARGET,
            "authoritative step {:08X}: {} octets",
            id,
            payload.len()
        );
    }
}
