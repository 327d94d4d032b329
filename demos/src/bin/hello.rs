//! Serves the hello handler on AWS Lambda.

use invocation_shell::{handler_fn, InvocationShell, ShellConfig};
use invocation_shell_demos::hello::handler;

#[tokio::main]
async fn main() -> Result<(), lambda_runtime::Error> {
    lambda_runtime::tracing::init_default_subscriber();

    let shell = InvocationShell::new(handler_fn(handler)).with_config(ShellConfig::from_env()?);
    invocation_shell::lambda::run(shell).await
}
