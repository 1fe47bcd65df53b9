fn main() -> anyhow::Result<()> {
    let matches = serterm::cli::parse_args();
    serterm::boot::run(&matches)
}
