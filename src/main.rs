fn main() -> anyhow::Result<()> {
    cartcheck_lib::run()
}
