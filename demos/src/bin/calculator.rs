//! Serves the calculator handler on AWS Lambda.

use invocation_shell::{InvocationShell, ShellConfig};
use invocation_shell_demos::calculator::Calculator;

#[tokio::main]
async fn main() -> Result<(), lambda_runtime::Error> {
    lambda_runtime::tracing::init_default_subscriber();

    let config = ShellConfig::from_env()?;
    tracing::info!(
        default_timeout_ms = config.default_timeout.as_millis() as u64,
        grace_period_ms = config.grace_period.as_millis() as u64,
        "starting calculator"
    );

    invocation_shell::lambda::run(InvocationShell::new(Calculator).with_config(config)).await
}
