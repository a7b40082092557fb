#[tokio::main]
async fn main() {
    if let Err(e) = reminder::run().await {
        eprintln!("{:?}", e);
        std::process::exit(1);
    }
}
