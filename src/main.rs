fn main() {
    #[cfg(feature = "cli")]
    hgrevlog::cli::run();

    #[cfg(not(feature = "cli"))]
    {
        eprintln!("hgrevlog: CLI not enabled. Rebuild with `--features cli`.");
        std::process::exit(1);
    }
}
