#[tokio::main]
async fn main() {
  // Minimal CLI: support --version/-V; configuration comes from TEMPINBOX_* env vars
  let mut args = std::env::args().skip(1);
  if let Some(arg) = args.next() {
    if arg == "--version" || arg == "-V" {
      println!("tempinbox {}", env!("CARGO_PKG_VERSION"));
      return;
    }
    if arg == "--help" || arg == "-h" {
      eprintln!("Usage: tempinbox [--version]");
      eprintln!();
      eprintln!("Environment:");
      eprintln!("  TEMPINBOX_SMTP_ADDR            SMTP listen address (0.0.0.0:2525)");
      eprintln!("  TEMPINBOX_WEB_ADDR             HTTP listen address (127.0.0.1:3000)");
      eprintln!("  TEMPINBOX_DATABASE             SQLite URL (sqlite://data/emails.db)");
      eprintln!("  TEMPINBOX_MAX_EMAIL_SIZE       maximum message size in bytes (10485760)");
      eprintln!("  TEMPINBOX_RETENTION_DAYS       days to keep mail (7)");
      eprintln!("  TEMPINBOX_SWEEP_INTERVAL_SECS  seconds between retention sweeps (3600)");
      eprintln!("  TEMPINBOX_ALLOWED_DOMAINS      comma separated domains, or * (*)");
      eprintln!("  TEMPINBOX_HOSTNAME             name announced in SMTP replies (tempinbox)");
      eprintln!("  TEMPINBOX_LIST_LIMIT           messages per mailbox listing (50)");
      return;
    }
  }

  if let Err(e) = tempinbox::app::run().await {
    eprintln!("error: {e}");
    std::process::exit(1);
  }
}
