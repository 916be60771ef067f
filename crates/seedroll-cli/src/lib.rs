mod cli;
mod config;
mod connect;
mod generate;
mod init;
mod logging;

pub async fn run(args: Vec<String>) -> anyhow::Result<()> {
    let cmd = cli::parse_args(&args)?;
    match cmd {
        cli::Command::Help(topic) => {
            cli::print_help(topic);
            Ok(())
        }
        cli::Command::Init(args) => init::run(args),
        cli::Command::Generate(args) => {
            dotenvy::dotenv().ok();
            logging::init();
            generate::run(args).await
        }
    }
}
