#[tokio::main]
async fn main() {
    if let Err(error) = blogwire_lib::run().await {
        eprintln!("blogwire: {error}");
        std::process::exit(1);
    }
}
