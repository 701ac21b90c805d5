use anyhow::Result;

use shardfall::{Engine, LevelLayout, Shardfall};

const LEVEL_PNG: &[u8] = include_bytes!("../assets/level.png");

fn main() -> Result<()> {
    env_logger::init();

    let layout = LevelLayout::decode_png(LEVEL_PNG)?;
    let game = Shardfall::new(layout);

    Engine::new()
        .with_title("Shardfall")
        .with_size(1280, 720)
        .run(game)
}
