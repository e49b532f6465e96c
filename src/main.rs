use anyhow::{Context, Result};
use clap::Parser;
use hostaudit::cli::Args;
use hostaudit::config::AuditSettings;
use hostaudit::output::{self, print_error, print_scan_header, print_warning};
use hostaudit::probes::system::run_local_checks;
use hostaudit::run_audit;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    if let Err(e) = run(args).await {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "hostaudit=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: Args) -> Result<()> {
    let settings = AuditSettings::load_or_default(args.config.as_deref());
    let plan = args.plan(&settings).context("invalid arguments")?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                print_warning("interrupted, finishing with the ports already scanned");
                cancel.cancel();
            }
        });
    }

    if args.verbose {
        print_scan_header(plan.target.host(), plan.target.ports().len());
    }

    let scan = plan.scan.clone().with_cancel(cancel);
    let mut report = run_audit(&plan.target, &scan, plan.audit.clone()).await;

    if plan.local_checks {
        let local = tokio::task::spawn_blocking(run_local_checks)
            .await
            .context("local checks failed")?;
        report.audit.attach_local_system(local);
    }

    info!(
        host = %report.audit.host,
        open = report.scan.open_ports.len(),
        severity = %report.audit.severity,
        "audit finished"
    );

    output::write_report(&report, plan.output, plan.output_path.as_deref())
        .context("failed to write report")?;
    Ok(())
}
