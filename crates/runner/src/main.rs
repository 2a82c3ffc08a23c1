//! `nfqlb`: control CLI and data-plane loop for the consistent-hashing
//! classifier (§6).

use std::io::{self, Read, Write};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nfqlb_common::LookupMode;
use nfqlb_runner::commands;
use nfqlb_runner::region::region_name;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nfqlb", about = "Consistent-hashing L4 load-balancer classifier")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Creates the shared lookup-table region.
    Create {
        /// Own fwmark, written into the region's header.
        #[arg(short = 'i', long = "own-fwmark", default_value_t = 0)]
        own_fwmark: i32,
        /// Offset added to backend indices to produce a fwmark.
        #[arg(short = 'o', long = "fw-offset", default_value_t = 1)]
        fw_offset: i32,
        /// Seed for reproducible table generation; omit for entropy.
        #[arg(short = 's', long = "seed")]
        seed: Option<u64>,
        /// Maglev table length M (clamped to a prime in [19, MAX_M]).
        m: Option<u32>,
        /// Backend-count upper bound N (clamped to [4, MAX_N]).
        n: Option<u32>,
    },
    /// Prints the current contents of the shared region.
    Show,
    /// Removes the shared region.
    Clean,
    /// Activates the given backend ids (mark space, i.e. already offset).
    Activate { ids: Vec<i64> },
    /// Deactivates the given backend ids.
    Deactivate { ids: Vec<i64> },
    /// Runs the data-plane classification loop.
    Run {
        /// Accepted for CLI compatibility; this surrogate transport always
        /// reads/writes the process's own stdio rather than binding a real
        /// NFQUEUE number.
        #[arg(short = 'q', long = "queue")]
        queue: Option<u16>,
        /// Enables the port-extension hashing key.
        #[arg(short = 'p', long = "port-extension")]
        port_extension: bool,
        /// Selects the lookup table consulted per packet.
        #[arg(short = 'm', long = "mode", default_value = "maglev")]
        mode: ModeArg,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum ModeArg {
    Maglev,
    Modulo,
}

impl From<ModeArg> for LookupMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Maglev => LookupMode::Maglev,
            ModeArg::Modulo => LookupMode::Modulo,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let name = region_name();

    match cli.command {
        Command::Create {
            own_fwmark,
            fw_offset,
            seed,
            m,
            n,
        } => commands::cmd_create(&name, own_fwmark, fw_offset, seed, m, n),
        Command::Show => {
            let text = commands::cmd_show(&name)?;
            print!("{text}");
            Ok(())
        }
        Command::Clean => commands::cmd_clean(&name),
        Command::Activate { ids } => commands::cmd_activate(&name, &ids),
        Command::Deactivate { ids } => commands::cmd_deactivate(&name, &ids),
        Command::Run {
            queue,
            port_extension,
            mode,
        } => {
            if let Some(q) = queue {
                tracing::info!(queue = q, "queue number accepted but unused by the stdio transport");
            }
            let stream = StdioStream::new();
            let packet_queue = commands::framed_queue(stream);
            commands::cmd_run(&name, mode.into(), port_extension, packet_queue)
        }
    }
    .with_context(|| format!("nfqlb command against region {name}"))
}

/// A duplex stream pairing stdin for inbound frames with stdout for
/// outbound verdicts, the default transport for `run`.
struct StdioStream {
    stdin: io::Stdin,
    stdout: io::Stdout,
}

impl StdioStream {
    fn new() -> Self {
        Self {
            stdin: io::stdin(),
            stdout: io::stdout(),
        }
    }
}

impl io::Read for StdioStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stdin.lock().read(buf)
    }
}

impl io::Write for StdioStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stdout.lock().write(buf)
    }
    fn flush(&mut self) -> io::Result<()> {
        self.stdout.lock().flush()
    }
}
