fn main() -> anyhow::Result<()> {
    bare::cli::run()
}
