#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = quiz_grader::run_worker().await {
        eprintln!("quiz-grader worker fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
