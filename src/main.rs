use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    stream_downloader_lib::run().await
}
