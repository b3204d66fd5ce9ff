use anyhow::{bail, Context, Result};
use clap::Parser;
use std::io::BufRead;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use vmprobe_qmp::{QmpConnection, QmpError};

#[derive(Parser, Debug)]
#[command(author, version, about = "VMProbe - QEMU monitor introspection client", long_about = None)]
struct Args {
    /// Path to the QMP UNIX socket
    #[arg(short = 'p', long = "socket")]
    socket: PathBuf,

    /// Open a fresh connection around every command
    #[arg(short = 'c', long)]
    reconnect: bool,

    /// Emit parsed results as JSON instead of text
    #[arg(long)]
    json: bool,

    /// Enable verbose protocol tracing
    #[arg(short, long)]
    trace: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.trace {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    // The monitor socket must already exist; anything else is a setup
    // problem, not something worth retrying.
    let meta = std::fs::metadata(&args.socket)
        .with_context(|| format!("failed stat on {:?}", args.socket))?;
    if !meta.file_type().is_socket() {
        bail!("{:?} is not a socket file", args.socket);
    }

    let mut conn = if args.reconnect {
        None
    } else {
        let conn = connect(&args.socket).context("unable to talk to the monitor")?;
        info!("established connection over {:?}", args.socket);
        Some(conn)
    };

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let Some(key) = line.trim().chars().next() else {
            continue;
        };
        if key == 'q' {
            break;
        }

        if args.reconnect {
            let mut fresh = connect(&args.socket).context("unable to talk to the monitor")?;
            dispatch(key, &mut fresh, args.json);
            if let Err(e) = fresh.close() {
                error!("failed to close the monitor connection: {e}");
            }
        } else if let Some(conn) = conn.as_mut() {
            dispatch(key, conn, args.json);
        }
    }

    if let Some(conn) = conn.take() {
        conn.close()
            .context("failed to close the monitor connection")?;
    }

    Ok(())
}

/// Establish and negotiate in one step. A connection that failed its
/// handshake is torn down before the error propagates.
fn connect(path: &Path) -> Result<QmpConnection, QmpError> {
    let mut conn = QmpConnection::connect(path)?;
    if let Err(e) = conn.negotiate() {
        let _ = conn.close();
        return Err(e);
    }
    Ok(conn)
}

fn dispatch(key: char, conn: &mut QmpConnection, json: bool) {
    match key {
        'r' => {
            if let Err(e) = show_registers(conn, json) {
                error!("failed to get registers: {e}");
            }
        }
        'v' => {
            if let Err(e) = show_vcpus(conn, json) {
                error!("failed to get cpus: {e}");
            }
        }
        'h' => help(),
        _ => {}
    }
}

fn show_registers(conn: &mut QmpConnection, json: bool) -> Result<()> {
    let regs = conn.query_registers()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&regs)?);
    } else {
        print!("{regs}");
    }
    Ok(())
}

fn show_vcpus(conn: &mut QmpConnection, json: bool) -> Result<()> {
    let cpus = conn.query_vcpus()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&cpus)?);
    } else {
        print!("{cpus}");
    }
    Ok(())
}

fn help() {
    println!("v -- VCPUs");
    println!("r -- Registers");
    println!("h -- Help");
    println!("q -- Quit");
}
