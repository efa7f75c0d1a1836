use anyhow::{bail, Context};
use batcol::literal::{render_output, Temporaries};
use batcol::{Engine, EngineConfig, Signature};
use clap::{Args, Parser, Subcommand};
use directories::BaseDirs;
use rustyline::{error::ReadlineError, DefaultEditor};
use serde_json::Value;
use std::{fs, path::PathBuf};

/// batcol command-line client.
#[derive(Parser)]
#[command(name = "batcolctl", author, version, about = "batcol CLI Tool", long_about = None)]
struct Cli {
    /// Execute one call (`name [operands...]`) and exit.
    #[arg(short = 'e', long = "exec")]
    call: Option<String>,

    /// Execute a file of calls, one per line, and exit.
    #[arg(short = 'f', long = "file")]
    file: Option<PathBuf>,

    #[command(flatten)]
    opts: Options,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Default)]
struct Options {
    /// Path to configuration file (default: $HOME/.batcolrc).
    #[arg(long = "config")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered operators.
    List,

    /// Invoke an operator.
    Call {
        /// Operator name, e.g. batstr.substring.
        name: String,
        /// JSON operands: arrays are columns, other values constants.
        operands: Vec<String>,
    },

    /// Print operator metrics in the Prometheus text format.
    Metrics,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli
        .opts
        .config
        .or_else(|| BaseDirs::new().map(|b| b.home_dir().join(".batcolrc")));

    let config = match config_path {
        Some(cfg) if cfg.exists() => {
            EngineConfig::load(&cfg).with_context(|| format!("failed to load {}", cfg.display()))?
        }
        _ => EngineConfig::default(),
    };
    let _log = match &config.log.dir {
        Some(dir) => batcol_log::init(dir, &config.log.level)?,
        None => batcol_log::init_stderr(&config.log.level)?,
    };

    let engine = Engine::start(config);
    let result = run(&engine, cli.call, cli.file, cli.command);
    let leaked = engine.shutdown();
    if leaked > 0 {
        tracing::warn!(columns = leaked, "columns still registered at shutdown");
    }
    result
}

fn run(engine: &Engine, call: Option<String>, file: Option<PathBuf>, command: Option<Commands>) -> anyhow::Result<()> {
    if let Some(line) = call {
        return execute(engine, &line);
    }

    if let Some(file) = file {
        let content = fs::read_to_string(file)?;
        for line in content.lines().map(str::trim) {
            if !line.is_empty() && !line.starts_with('#') {
                report(execute(engine, line));
            }
        }
        return Ok(());
    }

    match command {
        Some(Commands::List) => {
            list(engine);
            return Ok(());
        }
        Some(Commands::Call { name, operands }) => {
            let operands = operands
                .iter()
                .map(|s| serde_json::from_str(s).with_context(|| format!("invalid operand `{s}`")))
                .collect::<anyhow::Result<Vec<Value>>>()?;
            return invoke(engine, &name, &operands);
        }
        Some(Commands::Metrics) => {
            print!("{}", batcol_metrics::render()?);
            return Ok(());
        }
        None => {}
    }

    interactive_shell(engine)
}

/// Split `name [operands...]` and invoke it.
fn execute(engine: &Engine, line: &str) -> anyhow::Result<()> {
    let (name, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    invoke(engine, name, &parse_operands(rest)?)
}

/// Parse whitespace separated JSON values.
fn parse_operands(text: &str) -> anyhow::Result<Vec<Value>> {
    serde_json::Deserializer::from_str(text)
        .into_iter::<Value>()
        .collect::<Result<_, _>>()
        .with_context(|| format!("invalid operands `{text}`"))
}

/// Call `name`, print the result column and release everything created.
fn invoke(engine: &Engine, name: &str, operands: &[Value]) -> anyhow::Result<()> {
    let mut tmp = Temporaries::new(engine.columns());
    let operands = operands.iter().map(|v| tmp.operand(v)).collect::<Result<Vec<_>, _>>()?;
    let out = engine.call(name, &operands)?;
    let rendered = match render_output(engine.columns(), &out) {
        Ok(value) => value,
        Err(e) => bail!("result vanished: {e}"),
    };
    engine.release_output(&out)?;
    println!("{rendered}");
    Ok(())
}

fn signature(sig: &Signature) -> String {
    let params: Vec<String> = sig.params.iter().map(ToString::to_string).collect();
    match sig.outputs {
        1 => format!("{}({}) -> {}", sig.name, params.join(", "), sig.result),
        n => format!("{}({}) -> ({})", sig.name, params.join(", "), vec![sig.result.to_string(); n].join(", ")),
    }
}

fn list(engine: &Engine) {
    for sig in engine.functions().signatures() {
        println!("{}", signature(sig));
    }
}

fn report(result: anyhow::Result<()>) {
    if let Err(e) = result {
        eprintln!("Error: {e:#}");
    }
}

/// Interactive readline shell.
fn interactive_shell(engine: &Engine) -> anyhow::Result<()> {
    let mut rl = DefaultEditor::new()?;
    let prompt = "batcol> ";

    loop {
        match rl.readline(prompt) {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.eq_ignore_ascii_case("exit") || trimmed.eq("\\q") {
                    break;
                }
                if trimmed.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(trimmed);
                match trimmed {
                    "\\l" => list(engine),
                    "\\m" => report(batcol_metrics::render().map(|text| print!("{text}"))),
                    _ => report(execute(engine, trimmed)),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("Readline error: {err}");
                break;
            }
        }
    }
    Ok(())
}
