//! SQS Consumer - Entry Point
//!
//! Runs one registered handler against its queue.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    sqs_consumer::run().await
}
