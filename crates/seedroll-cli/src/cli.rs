use std::path::PathBuf;

pub const DEFAULT_CONFIG: &str = "seedroll.toml";

const USAGE: &str = "\
USAGE:
  seedroll <SERVICE_CODE> [OPTIONS]
  seedroll init [OPTIONS]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelpTopic {
    Root,
    Init,
}

#[derive(Debug, Clone)]
pub enum Command {
    Help(HelpTopic),
    Generate(GenerateArgs),
    Init(InitArgs),
}

#[derive(Debug, Clone)]
pub struct GenerateArgs {
    pub code: String,
    pub config: PathBuf,
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct InitArgs {
    pub config: PathBuf,
}

pub fn parse_args(args: &[String]) -> anyhow::Result<Command> {
    let mut it = args.iter().skip(1).map(|s| s.as_str()).peekable();
    match it.peek() {
        None => anyhow::bail!("missing service code\n\n{USAGE}"),
        Some(&"init") => {
            it.next();
            parse_init(it)
        }
        Some(_) => parse_generate(it),
    }
}

fn parse_generate<'a>(mut it: impl Iterator<Item = &'a str>) -> anyhow::Result<Command> {
    let mut code: Option<String> = None;
    let mut config = PathBuf::from(DEFAULT_CONFIG);
    let mut output_dir: Option<PathBuf> = None;

    while let Some(token) = it.next() {
        match token {
            "-h" | "--help" => return Ok(Command::Help(HelpTopic::Root)),
            "--config" => {
                let Some(v) = it.next() else {
                    anyhow::bail!("--config requires a value");
                };
                config = PathBuf::from(v);
            }
            _ if token.starts_with("--config=") => {
                config = PathBuf::from(token.trim_start_matches("--config="));
            }
            "--output-dir" => {
                let Some(v) = it.next() else {
                    anyhow::bail!("--output-dir requires a value");
                };
                output_dir = Some(PathBuf::from(v));
            }
            _ if token.starts_with("--output-dir=") => {
                output_dir = Some(PathBuf::from(token.trim_start_matches("--output-dir=")));
            }
            _ if token.starts_with('-') => anyhow::bail!("unknown option: {token}"),
            _ => {
                if let Some(first) = &code {
                    anyhow::bail!("unexpected argument: {token} (service code already given: {first})");
                }
                code = Some(token.to_string());
            }
        }
    }

    let Some(code) = code.filter(|c| !c.trim().is_empty()) else {
        anyhow::bail!("missing service code\n\n{USAGE}");
    };

    Ok(Command::Generate(GenerateArgs {
        code,
        config,
        output_dir,
    }))
}

fn parse_init<'a>(mut it: impl Iterator<Item = &'a str>) -> anyhow::Result<Command> {
    let mut config = PathBuf::from(DEFAULT_CONFIG);

    while let Some(token) = it.next() {
        match token {
            "-h" | "--help" => return Ok(Command::Help(HelpTopic::Init)),
            "--config" => {
                let Some(v) = it.next() else {
                    anyhow::bail!("--config requires a value");
                };
                config = PathBuf::from(v);
            }
            _ if token.starts_with("--config=") => {
                config = PathBuf::from(token.trim_start_matches("--config="));
            }
            other => anyhow::bail!("unexpected argument for init: {other}"),
        }
    }

    Ok(Command::Init(InitArgs { config }))
}

pub fn print_help(topic: HelpTopic) {
    match topic {
        HelpTopic::Root => {
            println!(
                "\
seedroll - generate replayable insert scripts and their rollback from live PostgreSQL data

{USAGE}

ARGS:
  <SERVICE_CODE>          Service whose rows are exported

OPTIONS:
  --config <FILE>         Config file path (default: {DEFAULT_CONFIG})
  --output-dir <DIR>      Override output_dir from config
  -h, --help              Print help

COMMANDS:
  init                    Write a config template

Logging is controlled by RUST_LOG (default: info)."
            );
        }
        HelpTopic::Init => {
            println!(
                "\
USAGE:
  seedroll init [OPTIONS]

OPTIONS:
  --config <FILE>         Config file path (default: {DEFAULT_CONFIG})
  -h, --help              Print help"
            );
        }
    }
}
