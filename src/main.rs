#[tokio::main]
async fn main() {
    ponsiv_waitlist::start_server().await;
}
