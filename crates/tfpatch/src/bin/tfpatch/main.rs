mod cli;

use tfpatch::patch;

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("TFPATCH_LOG"))
        .with_writer(std::io::stderr)
        .init();

    let command_result = match cli.command {
        cli::Command::Provider(command) => provider(command),
        cli::Command::Backend(command) => backend(command),
    };

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

fn provider(command: cli::ProviderCommand) -> anyhow::Result<()> {
    let overrides: patch::OverrideSpec = command.overrides.into_iter().collect();
    let outcomes = patch::patch_aws_provider_files(&command.files, &overrides)?;
    report(outcomes)
}

fn backend(command: cli::BackendCommand) -> anyhow::Result<()> {
    let outcomes =
        patch::patch_backend_files(&command.files, &command.module_name, command.env.as_deref());
    report(outcomes)
}

/// Prints per-file results; a failing file does not hide its siblings.
fn report(outcomes: Vec<patch::FileOutcome>) -> anyhow::Result<()> {
    let mut failures = 0usize;
    for outcome in outcomes {
        match outcome.result {
            Ok(true) => println!("patched {}", outcome.path.display()),
            Ok(false) => tracing::debug!(path = %outcome.path.display(), "unchanged"),
            Err(error) => {
                failures += 1;
                eprintln!("{}: {error}", outcome.path.display());
            }
        }
    }

    anyhow::ensure!(failures == 0, "{failures} file(s) could not be patched");
    Ok(())
}
