//! Shardfall: a physics-driven 2D arcade dodge game.
//!
//! The player star dodges homing bullets fired by wall-mounted shooters,
//! catches the occasional diamond for score and health, and can throw
//! embedded bullets back. The simulation lives in [`level`] and is fully
//! headless; [`engine`] and [`render`] provide the thin windowing and
//! drawing shell around it.

pub mod audio;
pub mod controller;
pub mod engine;
pub mod entity;
pub mod game;
pub mod hud;
pub mod input;
pub mod layout;
pub mod level;
pub mod math;
pub mod physics;
pub mod render;
pub mod shake;

pub use engine::{Engine, EngineConfig, EngineContext, Game};
pub use game::{GameState, Shardfall};
pub use layout::{Cell, LevelLayout};
pub use level::{Command, Level};
pub use math::{Camera2D, Vec2};
