#[tokio::main]
async fn main() {
    if let Err(e) = campus_helpdesk::run().await {
        tracing::error!("{e}");
        eprintln!("campus-helpdesk: {e}");
        std::process::exit(1);
    }
}
