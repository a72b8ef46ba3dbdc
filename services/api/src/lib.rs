mod cli;
mod infra;
mod routes;
mod server;

use realestate_ai::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
