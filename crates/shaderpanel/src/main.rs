mod cli;
mod run;
mod settings;

use anyhow::Result;
use cli::Command;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing(cli.verbose);

    match cli.command {
        Some(Command::Variants) => {
            run::list_variants();
            Ok(())
        }
        Some(Command::Check(args)) => {
            let config = settings::load_config(&args.shader)?;
            let asset = settings::resolve_asset(&config, &args.shader)?;
            let options = settings::resolve_options(&config, &args.shader);
            run::check(asset, options)
        }
        Some(Command::Run(args)) => run::run(settings::resolve_run(&args)?),
        None => run::run(settings::resolve_run(&cli.run)?),
    }
}
