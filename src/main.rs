use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use bpaf::{Bpaf, Parser};
use hpcalcs::config::Config;
use hpcalcs::{
    cable_new, calc_new, CableHandle, CableModel, CalcHandle, HpError, PrimeType,
    ScreenshotFormat, VarEntry,
};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn verbose() -> impl Parser<usize> {
    bpaf::short('v')
        .long("verbose")
        .help("Increase log verbosity (info, debug, trace). RUST_LOG takes precedence.")
        .req_flag(())
        .count()
}

#[derive(Clone, Debug, Bpaf)]
#[bpaf(options, version, descr(env!("CARGO_PKG_DESCRIPTION")))]
struct Cli {
    /// Cable model to use (nul, prime-hid). Defaults to the configured one.
    #[bpaf(long, argument("MODEL"))]
    cable: Option<CableModel>,
    /// Read timeout for a single report, e.g. 500ms or 2s
    #[bpaf(long, argument("DURATION"))]
    timeout: Option<humantime::Duration>,
    /// Negotiate the extended protocol before running the command
    #[bpaf(long)]
    extended: bool,
    #[bpaf(external)]
    verbose: usize,
    #[bpaf(external(command))]
    command: Command,
}

#[derive(Clone, Debug, Bpaf)]
enum Command {
    /// Check that the cable's device is plugged in
    #[bpaf(command)]
    Probe,
    /// Check that the calculator answers
    #[bpaf(command)]
    Ready,
    /// Fetch the calculator information blob
    #[bpaf(command)]
    Info {
        /// Write the blob to a file instead of dumping it
        #[bpaf(short, long, argument("PATH"))]
        output: Option<PathBuf>,
    },
    /// Sync the calculator clock to the system clock
    #[bpaf(command("set-time"))]
    SetTime,
    /// Save a screenshot
    #[bpaf(command, fallback_to_usage)]
    Screenshot {
        /// Image format (320x240x16, 320x240x4, 160x120x16, 160x120x4)
        #[bpaf(short, long, argument("FORMAT"), fallback(ScreenshotFormat::default()))]
        format: ScreenshotFormat,
        /// Where to write the png
        #[bpaf(short, long, argument("PATH"))]
        output: PathBuf,
    },
    /// Send a file to the calculator, named after the file stem
    #[bpaf(command("send-file"), fallback_to_usage)]
    SendFile {
        /// Variable type (prgm, note, list, matrix, real, complex, ...)
        #[bpaf(short('t'), long("type"), argument("TYPE"))]
        var_type: PrimeType,
        /// File to send
        #[bpaf(positional("PATH"), guard(|p| p.exists(), "file not found"))]
        path: PathBuf,
    },
    /// Fetch one variable from the calculator
    #[bpaf(command("recv-file"), fallback_to_usage)]
    RecvFile {
        /// Variable type (prgm, note, list, matrix, real, complex, ...)
        #[bpaf(short('t'), long("type"), argument("TYPE"))]
        var_type: PrimeType,
        /// Where to write the variable content
        #[bpaf(short, long, argument("PATH"))]
        output: PathBuf,
        /// Variable name on the calculator
        #[bpaf(positional("NAME"))]
        name: String,
    },
    /// Fetch every variable from the calculator
    #[bpaf(command)]
    Backup {
        /// Directory receiving one file per variable
        #[bpaf(short, long, argument("DIR"), fallback(PathBuf::from(".")))]
        dir: PathBuf,
    },
    /// Press keys on the calculator
    #[bpaf(command, fallback_to_usage)]
    Key {
        /// Key codes, sent in one message when more than one is given
        #[bpaf(positional("CODE"), some("expected at least one key code"))]
        codes: Vec<u8>,
    },
    /// Send a chat message
    #[bpaf(command, fallback_to_usage)]
    Chat {
        #[bpaf(positional("TEXT"))]
        text: String,
    },
    /// Wait for a chat message and print it
    #[bpaf(command("recv-chat"))]
    RecvChat,
}

/// Install the log subscriber. RUST_LOG wins, then -v, then the config file.
fn init_logging(verbose: usize, configured: &str) {
    let default = match verbose {
        0 => configured,
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn print_hex(bytes: &[u8]) {
    for (i, line) in bytes.chunks(16).enumerate() {
        println!("{:04x}: {}", i * 16, hex::encode(line));
    }
}

/// Where a backed up variable lands inside `dir`. Names come from the
/// calculator, so separators and parent references are neutralised.
fn backup_path(dir: &Path, name: &str, kind: &str) -> PathBuf {
    let mut safe: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c => c,
        })
        .collect();
    if safe.is_empty() || safe.starts_with('.') {
        safe.insert(0, '_');
    }
    dir.join(format!("{safe}.{kind}"))
}

fn probe(mut cable: CableHandle) -> Result<(), Box<dyn Error>> {
    cable.probe()?;
    println!("{} found", cable.info().name);
    Ok(())
}

fn run(calc: &CalcHandle, command: Command) -> Result<(), Box<dyn Error>> {
    match command {
        Command::Probe => calc.with_cable(CableHandle::probe)??,
        Command::Ready => {
            let reply = calc.check_ready()?;
            println!("calculator ready ({})", hex::encode(&reply));
        },
        Command::Info { output } => {
            let infos = calc.get_infos()?;
            match output {
                Some(path) => {
                    fs::write(&path, &infos.data)?;
                    println!("wrote {} bytes to {}", infos.data.len(), path.display());
                },
                None => print_hex(&infos.data),
            }
        },
        Command::SetTime => {
            let now = chrono::Local::now();
            calc.set_date_time(now.timestamp())?;
            println!("updated time to {now}");
        },
        Command::Screenshot { format, output } => {
            let png = calc.recv_screen(format)?;
            fs::write(&output, &png)?;
            println!("wrote {} bytes to {}", png.len(), output.display());
        },
        Command::SendFile { var_type, path } => {
            let entry = VarEntry::from_file(&path, var_type.into())?;
            calc.send_file(&entry)?;
            println!("sent {} ({} bytes)", entry.name, entry.size());
        },
        Command::RecvFile {
            var_type,
            output,
            name,
        } => {
            let request = VarEntry::with_data_and_name(&name, var_type.into(), &[]);
            let entry = calc
                .recv_file(&request)?
                .ok_or_else(|| format!("{name} not found on the calculator"))?;
            if entry.invalid {
                eprintln!("warning: checksum mismatch, {name} may be corrupt");
            }
            fs::write(&output, &entry.data)?;
            println!("wrote {} bytes to {}", entry.size(), output.display());
        },
        Command::Backup { dir } => {
            let backup = calc.recv_backup()?;
            fs::create_dir_all(&dir)?;
            for entry in &backup.entries {
                let kind = PrimeType::from(entry.var_type).to_string().to_lowercase();
                let path = backup_path(&dir, &entry.name, &kind);
                fs::write(&path, &entry.data)?;
                let flag = if entry.invalid { " (checksum mismatch)" } else { "" };
                println!("{}{flag}", path.display());
            }
            if let Some(e) = backup.error {
                eprintln!("backup incomplete after {} files", backup.entries.len());
                return Err(e.into());
            }
        },
        Command::Key { codes } => match codes.as_slice() {
            [code] => calc.send_key(*code)?,
            codes => calc.send_keys(codes)?,
        },
        Command::Chat { text } => calc.send_chat(&text)?,
        Command::RecvChat => println!("{}", calc.recv_chat()?),
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = cli().run();
    let config = Config::load_or_create().unwrap_or_else(|e| {
        eprintln!("failed to load config, using defaults: {e}");
        Config::default()
    });
    init_logging(cli.verbose, &config.log.level);

    let cable_model = match cli.cable {
        Some(model) => model,
        None => config.cable_model()?,
    };
    let mut cable = cable_new(cable_model);
    cable.set_read_timeout(cli.timeout.map_or(config.cable.read_timeout, Into::into));

    if let Command::Probe = cli.command {
        return probe(cable);
    }

    let calc = calc_new(config.calc_model()?);
    calc.attach(cable).map_err(HpError::from)?;
    if cli.extended || config.calc.extended_protocol {
        calc.enable_extended_protocol()?;
        info!("extended protocol enabled");
    }
    run(&calc, cli.command).inspect_err(|e| {
        if let Some(e) = e.downcast_ref::<HpError>() {
            let code = e.code();
            eprintln!("error {}: {}", u32::from(code), code.message());
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        let cli = cli()
            .run_inner(&["--cable", "nul", "-vv", "key", "30", "31"])
            .unwrap();
        assert_eq!(cli.cable, Some(CableModel::Nul));
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Command::Key { codes } if codes == [30, 31]));

        let cli = cli()
            .run_inner(&["recv-file", "-t", "prgm", "-o", "out.bin", "Prog"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Command::RecvFile { var_type: PrimeType::Prgm, ref name, .. } if name == "Prog"
        ));
    }

    #[test]
    fn rejects_unknown_cable() {
        assert!(cli().run_inner(&["--cable", "serial", "ready"]).is_err());
    }

    #[test]
    fn backup_paths_stay_inside_dir() {
        let dir = Path::new("backup");
        assert_eq!(
            backup_path(dir, "Prog", "prgm"),
            Path::new("backup/Prog.prgm")
        );
        for name in ["../evil", "a/b", "..", "/etc/passwd", "c:\\x", ""] {
            let path = backup_path(dir, name, "note");
            assert_eq!(path.parent(), Some(dir), "{name:?}");
            assert!(!path
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with('.'));
        }
    }

    #[test]
    fn generate_docs() {
        let app = env!("CARGO_PKG_NAME");
        let options = cli();

        let roff = options.render_manpage(app, bpaf::doc::Section::General, None, None, None);
        std::fs::write("docs/hpcalcs.1", roff).expect("failed to write manpage");

        let md = options.header("").render_markdown(app);
        std::fs::write("docs/README.md", md).expect("failed to write markdown docs");
    }
}
