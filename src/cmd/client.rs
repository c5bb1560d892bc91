#[tokio::main]
async fn main() {
    meshtun::client::main::run_client().await;
}
