use anyhow::Result;

fn main() -> Result<()> {
    tidelog::run()?;
    Ok(())
}
