use anyhow::Result;
use log::info;
use winit::event::MouseButton;
use winit::keyboard::KeyCode;

use crate::controller::Action;
use crate::engine::{EngineContext, Game};
use crate::hud;
use crate::layout::LevelLayout;
use crate::level::Level;
use crate::math::{screen_projection, Camera2D, Vec2};
use crate::render::DrawBatch;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GameState {
    MainMenu,
    CreatingLevel,
    Playing,
    GameOver,
}

/// The game shell: owns the layout, the current level and the state
/// transitions between menu, play and game over.
pub struct Shardfall {
    layout: LevelLayout,
    state: GameState,
    level: Option<Level>,
    menu_time: f32,
}

impl Shardfall {
    pub fn new(layout: LevelLayout) -> Self {
        Self {
            layout,
            state: GameState::MainMenu,
            level: None,
            menu_time: 0.0,
        }
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    /// Per-frame, edge-triggered input: state transitions and firing.
    fn handle_frame_input(&mut self, ctx: &mut EngineContext<'_>) {
        let enter = ctx.input().is_key_pressed(KeyCode::Enter);
        let escape = ctx.input().is_key_pressed(KeyCode::Escape);
        let fire = ctx.input().is_mouse_pressed(MouseButton::Left);

        match self.state {
            GameState::MainMenu => {
                if enter {
                    self.state = GameState::CreatingLevel;
                } else if escape {
                    ctx.request_exit();
                }
            }
            GameState::CreatingLevel => {}
            GameState::Playing => {
                if let Some(level) = self.level.as_mut() {
                    if fire {
                        level.fire_pressed();
                    }
                }
            }
            GameState::GameOver => {
                if escape {
                    info!("back to the main menu");
                    self.level = None;
                    self.state = GameState::MainMenu;
                } else if enter {
                    self.state = GameState::CreatingLevel;
                }
            }
        }
    }

    /// Mirror held keys and the pointer into the level's controller.
    fn sync_controller(&mut self, ctx: &mut EngineContext<'_>) {
        let viewport = ctx.renderer().surface_size();
        let input = ctx.input();

        let jump = input.is_key_down(KeyCode::KeyW)
            || input.is_key_down(KeyCode::ArrowUp)
            || input.is_key_down(KeyCode::Space);
        let left = input.is_key_down(KeyCode::KeyA) || input.is_key_down(KeyCode::ArrowLeft);
        let right = input.is_key_down(KeyCode::KeyD) || input.is_key_down(KeyCode::ArrowRight);
        let pointer = input.mouse_position();

        if let Some(level) = self.level.as_mut() {
            let camera = level.camera();
            let controller = &mut level.controller;
            controller.set_pressed(Action::Jump, jump);
            controller.set_pressed(Action::Left, left);
            controller.set_pressed(Action::Right, right);
            controller.set_pointer(pointer);
            controller.sync_view(viewport, camera);
        }
    }

    fn create_level(&mut self) -> Result<()> {
        let seed: u64 = rand::random();
        self.level = Some(self.layout.generate(seed)?);
        self.state = GameState::Playing;
        info!("level ready, seed {seed}");
        Ok(())
    }

    fn player_snapshot(&self) -> Option<(u32, u32)> {
        self.level
            .as_ref()
            .and_then(|level| level.player_entity())
            .and_then(|entity| entity.as_player())
            .map(|player| (player.score, player.health))
    }
}

impl Game for Shardfall {
    fn update(&mut self, ctx: &mut EngineContext<'_>) -> Result<()> {
        self.handle_frame_input(ctx);

        if self.state == GameState::CreatingLevel {
            // Levels are cheap enough to rebuild from scratch each run.
            self.create_level()?;
            ctx.audio().start_music();
        }

        if self.state == GameState::Playing {
            self.sync_controller(ctx);
        }

        let before = self.player_snapshot();
        let dt = ctx.fixed_delta_time().as_secs_f32();
        while ctx.should_run_fixed_update() {
            self.menu_time += dt;
            if self.state == GameState::Playing {
                if let Some(level) = self.level.as_mut() {
                    if !level.update(dt) {
                        self.state = GameState::GameOver;
                        ctx.audio().stop_music();
                        ctx.audio().play_game_over();
                    }
                }
            }
        }

        // Feedback cues derived from the simulation outcome.
        if let (Some((score0, health0)), Some((score1, health1))) =
            (before, self.player_snapshot())
        {
            if score1 > score0 {
                ctx.audio().play_pickup();
            }
            if health1 < health0 {
                ctx.audio().play_hit();
            }
        }

        Ok(())
    }

    fn draw(&mut self, ctx: &mut EngineContext<'_>) -> Result<()> {
        let viewport = ctx.renderer().surface_size();
        let mut world = DrawBatch::new();
        let mut screen = DrawBatch::new();

        match self.state {
            GameState::MainMenu | GameState::CreatingLevel => {
                hud::draw_main_menu(&mut screen, viewport, self.menu_time);
            }
            GameState::Playing | GameState::GameOver => {
                if let Some(level) = &self.level {
                    level.draw(&mut world);
                    if let Some(player) =
                        level.player_entity().and_then(|entity| entity.as_player())
                    {
                        hud::draw_hud(&mut screen, viewport, player);
                        if self.state == GameState::GameOver {
                            hud::draw_game_over(&mut screen, viewport, player);
                        }
                    }
                }
            }
        }

        let camera = self
            .level
            .as_ref()
            .map(|level| level.camera())
            .unwrap_or_else(|| Camera2D::new(Vec2::new(12.0, 12.0)));

        let world_view_proj = camera.view_projection(viewport.0, viewport.1);
        let screen_view_proj = screen_projection(viewport.0, viewport.1);
        ctx.renderer()
            .render(&world, world_view_proj, &screen, screen_view_proj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Cell;

    fn tiny_layout() -> LevelLayout {
        LevelLayout::from_cells(
            3,
            1,
            vec![Cell::Wall, Cell::Wall, Cell::Wall],
        )
        .unwrap()
    }

    #[test]
    fn starts_in_the_main_menu_without_a_level() {
        let game = Shardfall::new(tiny_layout());
        assert_eq!(game.state(), GameState::MainMenu);
        assert!(game.level.is_none());
    }

    #[test]
    fn creating_a_level_moves_to_playing() {
        let mut game = Shardfall::new(tiny_layout());
        game.state = GameState::CreatingLevel;
        game.create_level().unwrap();
        assert_eq!(game.state(), GameState::Playing);
        assert!(game.level.is_some());
    }
}
