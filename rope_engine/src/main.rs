use anyhow::Result;

mod cli;

fn main() -> Result<()> {
    env_logger::init();
    let options = cli::parse()?;
    rope_engine::runtime::execute(options)
}
