use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use healthcard_pace::crypt::elliptic::curves::NamedCurve;
use healthcard_pace::hex_dump;
use healthcard_pace::iso7816::card::SmartCard;
use healthcard_pace::pace::{CardAccessNumber, PaceKey};
use healthcard_pace::pace::trusted_channel::{
    CardAccessNumberResponder, CardAccessNumberSupplier, NegotiationConfig, StaticCardAccessNumber,
    TrustedChannelConstructor,
};
use healthcard_pace::simulator::SimulatedHealthCard;
use tracing::debug;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;


#[derive(Debug, Parser)]
#[command(about = "Negotiate PACE keys with a health card using its Card Access Number")]
struct Cli {
    /// Log the individual protocol steps.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Negotiate with a simulated card.
    Simulate(SimulateOpts),

    /// List the available PC/SC readers.
    #[cfg(feature = "pcsc")]
    ListReaders,

    /// Negotiate with the card in a PC/SC reader.
    #[cfg(feature = "pcsc")]
    Negotiate(NegotiateOpts),
}

#[derive(Clone, Debug, Args)]
struct NegotiationOpts {
    /// The Card Access Number; prompted for if not given.
    #[arg(long)]
    can: Option<String>,

    /// Seconds to wait for the Card Access Number.
    #[arg(long = "can-timeout", default_value_t = 30)]
    can_timeout_secs: u64,

    /// Print the negotiated keys instead of only their check value.
    #[arg(long)]
    show_keys: bool,
}

#[derive(Clone, Debug, Args)]
struct SimulateOpts {
    #[command(flatten)]
    negotiation: NegotiationOpts,

    /// The Card Access Number of the simulated card.
    #[arg(long, default_value = "123123")]
    card_can: String,

    #[arg(long, value_enum, default_value_t = CurveArg::BrainpoolP256r1)]
    curve: CurveArg,
}

#[cfg(feature = "pcsc")]
#[derive(Clone, Debug, Args)]
struct NegotiateOpts {
    #[command(flatten)]
    negotiation: NegotiationOpts,

    #[arg(short, long = "reader", default_value = "0")]
    reader_index: usize,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum CurveArg {
    #[value(name = "brainpoolP256r1")]
    BrainpoolP256r1,
    #[value(name = "brainpoolP384r1")]
    BrainpoolP384r1,
    #[value(name = "brainpoolP512r1")]
    BrainpoolP512r1,
}
impl From<CurveArg> for NamedCurve {
    fn from(value: CurveArg) -> Self {
        match value {
            CurveArg::BrainpoolP256r1 => NamedCurve::BrainpoolP256r1,
            CurveArg::BrainpoolP384r1 => NamedCurve::BrainpoolP384r1,
            CurveArg::BrainpoolP512r1 => NamedCurve::BrainpoolP512r1,
        }
    }
}


/// Asks for the Card Access Number on the terminal.
struct PromptCardAccessNumber;
impl CardAccessNumberSupplier for PromptCardAccessNumber {
    fn request_card_access_number(&self, responder: CardAccessNumberResponder) {
        // reading stdin blocks, so do it on a thread of its own
        std::thread::spawn(move || {
            eprint!("Card Access Number: ");
            // an unflushed prompt only delays its display; reading the answer still works
            let _ = io::stderr().flush();

            let mut line = String::new();
            if let Err(e) = io::stdin().lock().read_line(&mut line) {
                eprintln!("failed to read the Card Access Number: {}", e);
                return;
            }
            match line.trim().parse::<CardAccessNumber>() {
                Ok(can) => {
                    if responder.respond(can).is_err() {
                        eprintln!("too late; the negotiation is no longer waiting");
                    }
                },
                Err(e) => eprintln!("invalid Card Access Number: {}", e),
            }
        });
    }
}


fn setup_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };

    // RUST_LOG takes precedence over --verbose
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}


fn print_key(key: &PaceKey, show_keys: bool) {
    println!("check value: {}", hex_dump(&key.check_value()));
    if show_keys {
        println!("K_enc:       {}", hex_dump(key.enc_key()));
        println!("K_mac:       {}", hex_dump(key.mac_key()));
    }
}


fn print_error(error: &dyn std::error::Error) {
    eprintln!("error: {}", error);
    let mut source = error.source();
    while let Some(cause) = source {
        eprintln!("  caused by: {}", cause);
        source = cause.source();
    }
}


async fn negotiate<C: SmartCard + Send + 'static>(card: C, opts: &NegotiationOpts) -> Result<(C, PaceKey), ExitCode> {
    let config = NegotiationConfig {
        can_timeout: Duration::from_secs(opts.can_timeout_secs),
    };
    let outcome = match &opts.can {
        Some(digits) => {
            let can: CardAccessNumber = digits.parse()
                .map_err(|e| {
                    print_error(&e);
                    ExitCode::FAILURE
                })?;
            TrustedChannelConstructor::new(StaticCardAccessNumber::new(can))
                .with_config(config)
                .negotiate(card).await
        },
        None => {
            TrustedChannelConstructor::new(PromptCardAccessNumber)
                .with_config(config)
                .negotiate(card).await
        },
    };

    match outcome.result {
        Ok(key) => {
            print_key(&key, opts.show_keys);
            Ok((outcome.card, key))
        },
        Err(e) => {
            print_error(&e);
            if let Some(step) = e.step() {
                eprintln!("  at step: {}", step);
            }
            Err(ExitCode::FAILURE)
        },
    }
}


async fn simulate(opts: SimulateOpts) -> Result<(), ExitCode> {
    let card_can: CardAccessNumber = opts.card_can.parse()
        .map_err(|e| {
            print_error(&e);
            ExitCode::FAILURE
        })?;
    let card = SimulatedHealthCard::with_curve(card_can, opts.curve.into());

    let (card, key) = negotiate(card, &opts.negotiation).await?;
    debug!(steps = ?card.received_steps(), "simulated card received commands");
    if card.established_key() != Some(&key) {
        eprintln!("error: the simulated card derived different keys");
        return Err(ExitCode::FAILURE);
    }
    Ok(())
}


#[cfg(feature = "pcsc")]
fn list_readers(ctx: &pcsc::Context) -> Result<Vec<std::ffi::CString>, pcsc::Error> {
    let readers_buf_len = ctx.list_readers_len()?;
    let mut readers_buf = vec![0u8; readers_buf_len];
    let readers = ctx.list_readers(&mut readers_buf)?
        .map(|reader| reader.to_owned())
        .collect();
    Ok(readers)
}


#[cfg(feature = "pcsc")]
async fn run_pcsc(command: Commands) -> Result<(), ExitCode> {
    let ctx = pcsc::Context::establish(pcsc::Scope::User)
        .map_err(|e| {
            eprintln!("failed to establish PC/SC user context: {}", e);
            ExitCode::FAILURE
        })?;
    let readers = list_readers(&ctx)
        .map_err(|e| {
            eprintln!("failed to list PC/SC readers: {}", e);
            ExitCode::FAILURE
        })?;

    match command {
        Commands::ListReaders => {
            for (i, reader) in readers.iter().enumerate() {
                println!("{}: {:?}", i, reader);
            }
            Ok(())
        },
        Commands::Negotiate(opts) => {
            let Some(reader) = readers.get(opts.reader_index) else {
                eprintln!("no reader at index {}", opts.reader_index);
                return Err(ExitCode::FAILURE);
            };
            let card = ctx.connect(reader, pcsc::ShareMode::Shared, pcsc::Protocols::ANY)
                .map_err(|e| {
                    eprintln!("failed to connect to card: {}", e);
                    ExitCode::FAILURE
                })?;
            negotiate(card, &opts.negotiation).await?;
            Ok(())
        },
        Commands::Simulate(opts) => simulate(opts).await,
    }
}


#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let result = match cli.command {
        Commands::Simulate(opts) => simulate(opts).await,
        #[cfg(feature = "pcsc")]
        other => run_pcsc(other).await,
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => code,
    }
}
