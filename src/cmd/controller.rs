#[tokio::main]
async fn main() {
    meshtun::controller::main::run_controller().await;
}
