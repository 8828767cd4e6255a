//! Skirmish - a small one-on-one grid combat simulation implementing
//! [`Environment`], used for local training runs and tests

use burn::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::action_set::ActionSet;
use super::env::{Environment, StepInfo, StepResult};
use super::observation::{Observation, ObservationShape};
use crate::error::{self, TrainError};

const EMPTY: f32 = 0.0;
const WALL: f32 = 64.0;
const PLAYER: f32 = 128.0;
const ENEMY: f32 = 192.0;

/// Facing directions, indexed by `facing`: up, left, down, right
const DIRECTIONS: [(i32, i32); 4] = [(0, -1), (-1, 0), (0, 1), (1, 0)];

/// Environment configuration
#[derive(Config, Debug)]
pub struct SkirmishConfig {
    /// Side length of the square arena (also the observation grid size)
    #[config(default = 11)]
    pub grid_size: usize,
    /// Maximum steps per episode
    #[config(default = 200)]
    pub max_steps: usize,
    /// Number of interior wall tiles
    #[config(default = 8)]
    pub num_walls: usize,
    #[config(default = 10)]
    pub player_health: i32,
    #[config(default = 6)]
    pub enemy_health: i32,
    #[config(default = 10)]
    pub ammo: i32,
    /// Shooting range in tiles
    #[config(default = 5)]
    pub shot_range: i32,
    /// Probability that an adjacent enemy lands a hit each step
    #[config(default = 0.3)]
    pub enemy_hit_chance: f32,
    /// Penalty for each step (encourages faster fights)
    #[config(default = "-0.01")]
    pub step_penalty: f32,
    #[config(default = 10.0)]
    pub kill_bonus: f32,
    #[config(default = "-10.0")]
    pub death_penalty: f32,
    #[config(default = 42)]
    pub seed: u64,
}

/// Length of both status vectors
pub const STATUS_LEN: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Unit {
    x: i32,
    y: i32,
    health: i32,
}

pub struct SkirmishEnv {
    config: SkirmishConfig,
    actions: ActionSet,
    rng: StdRng,
    walls: Vec<bool>,
    player: Unit,
    facing: usize,
    ammo: i32,
    enemy: Unit,
    steps: usize,
}

impl SkirmishEnv {
    pub fn new(config: SkirmishConfig) -> error::Result<Self> {
        if config.grid_size < 4 {
            return Err(TrainError::Config(format!(
                "arena side {} is too small",
                config.grid_size
            )));
        }
        let interior = (config.grid_size - 2) * (config.grid_size - 2);
        if config.num_walls + 2 > interior {
            return Err(TrainError::Config(format!(
                "{} walls leave no room for both units in a {}x{} arena",
                config.num_walls, config.grid_size, config.grid_size
            )));
        }

        let rng = StdRng::seed_from_u64(config.seed);
        let cells = config.grid_size * config.grid_size;
        let mut env = Self {
            actions: ActionSet::strikeforce(),
            rng,
            walls: vec![false; cells],
            player: Unit { x: 1, y: 1, health: config.player_health },
            facing: 2,
            ammo: config.ammo,
            enemy: Unit { x: 1, y: 1, health: config.enemy_health },
            steps: 0,
            config,
        };
        env.setup_arena();
        Ok(env)
    }

    pub fn observation_shape(&self) -> ObservationShape {
        ObservationShape::new(self.config.grid_size, STATUS_LEN, STATUS_LEN)
    }

    fn index(&self, x: i32, y: i32) -> usize {
        y as usize * self.config.grid_size + x as usize
    }

    fn in_bounds(&self, x: i32, y: i32) -> bool {
        let n = self.config.grid_size as i32;
        x >= 0 && y >= 0 && x < n && y < n
    }

    fn is_wall(&self, x: i32, y: i32) -> bool {
        !self.in_bounds(x, y) || self.walls[self.index(x, y)]
    }

    fn random_free_cell(&mut self, avoid: Option<(i32, i32)>) -> (i32, i32) {
        let n = self.config.grid_size as i32;
        loop {
            let x = self.rng.random_range(1..n - 1);
            let y = self.rng.random_range(1..n - 1);
            if !self.is_wall(x, y) && avoid != Some((x, y)) {
                return (x, y);
            }
        }
    }

    fn setup_arena(&mut self) {
        let n = self.config.grid_size as i32;
        self.walls.iter_mut().for_each(|w| *w = false);
        for i in 0..n {
            for (x, y) in [(i, 0), (i, n - 1), (0, i), (n - 1, i)] {
                let idx = self.index(x, y);
                self.walls[idx] = true;
            }
        }
        for _ in 0..self.config.num_walls {
            let (x, y) = self.random_free_cell(None);
            let idx = self.index(x, y);
            self.walls[idx] = true;
        }

        let (px, py) = self.random_free_cell(None);
        let (ex, ey) = self.random_free_cell(Some((px, py)));
        self.player = Unit { x: px, y: py, health: self.config.player_health };
        self.enemy = Unit { x: ex, y: ey, health: self.config.enemy_health };
        self.facing = 2;
        self.ammo = self.config.ammo;
        self.steps = 0;
    }

    fn observe(&self) -> Observation {
        let n = self.config.grid_size as f32;
        let mut grid: Vec<f32> = self
            .walls
            .iter()
            .map(|&wall| if wall { WALL } else { EMPTY })
            .collect();
        let player_idx = self.index(self.player.x, self.player.y);
        grid[player_idx] = PLAYER;
        if self.enemy.health > 0 {
            let enemy_idx = self.index(self.enemy.x, self.enemy.y);
            grid[enemy_idx] = ENEMY;
        }

        let (fx, fy) = DIRECTIONS[self.facing];
        let self_status = vec![
            self.player.x as f32 / n,
            self.player.y as f32 / n,
            fx as f32,
            fy as f32,
            self.player.health as f32 / self.config.player_health.max(1) as f32,
            self.ammo as f32 / self.config.ammo.max(1) as f32,
            self.steps as f32 / self.config.max_steps.max(1) as f32,
        ];

        let dx = self.enemy.x - self.player.x;
        let dy = self.enemy.y - self.player.y;
        let enemy_status = vec![
            self.enemy.x as f32 / n,
            self.enemy.y as f32 / n,
            dx as f32 / n,
            dy as f32 / n,
            self.enemy.health.max(0) as f32 / self.config.enemy_health.max(1) as f32,
            (dx.abs() + dy.abs()) as f32 / (2.0 * n),
            if self.enemy.health > 0 { 1.0 } else { 0.0 },
        ];

        Observation::new(grid, self_status, enemy_status)
    }

    fn try_move(&mut self, direction: usize) {
        self.facing = direction;
        let (dx, dy) = DIRECTIONS[direction];
        let (x, y) = (self.player.x + dx, self.player.y + dy);
        let blocked = self.is_wall(x, y) || (self.enemy.health > 0 && (x, y) == (self.enemy.x, self.enemy.y));
        if !blocked {
            self.player.x = x;
            self.player.y = y;
        }
    }

    /// Damage dealt to the enemy by a punch or shot along the facing direction
    fn attack(&mut self, range: i32, damage: i32) -> i32 {
        let (dx, dy) = DIRECTIONS[self.facing];
        for distance in 1..=range {
            let (x, y) = (self.player.x + dx * distance, self.player.y + dy * distance);
            if self.is_wall(x, y) {
                return 0;
            }
            if self.enemy.health > 0 && (x, y) == (self.enemy.x, self.enemy.y) {
                let dealt = damage.min(self.enemy.health);
                self.enemy.health -= dealt;
                return dealt;
            }
        }
        0
    }

    fn enemy_turn(&mut self) -> i32 {
        if self.enemy.health <= 0 {
            return 0;
        }
        let dx = self.player.x - self.enemy.x;
        let dy = self.player.y - self.enemy.y;
        if dx.abs() + dy.abs() == 1 {
            return if self.rng.random::<f32>() < self.config.enemy_hit_chance { 1 } else { 0 };
        }

        let step = if dx.abs() >= dy.abs() { (dx.signum(), 0) } else { (0, dy.signum()) };
        let (x, y) = (self.enemy.x + step.0, self.enemy.y + step.1);
        if !self.is_wall(x, y) && (x, y) != (self.player.x, self.player.y) {
            self.enemy.x = x;
            self.enemy.y = y;
        }
        0
    }
}

impl Environment for SkirmishEnv {
    fn action_set(&self) -> &ActionSet {
        &self.actions
    }

    fn reset(&mut self) -> error::Result<Observation> {
        self.setup_arena();
        Ok(self.observe())
    }

    fn step(&mut self, action: usize) -> error::Result<StepResult> {
        let symbol = self.actions.symbol(action)?;
        self.steps += 1;

        let dealt = match symbol {
            'w' => {
                self.try_move(0);
                0
            }
            'a' => {
                self.try_move(1);
                0
            }
            's' => {
                self.try_move(2);
                0
            }
            'd' => {
                self.try_move(3);
                0
            }
            '1' => {
                self.facing = (self.facing + 1) % DIRECTIONS.len();
                0
            }
            'p' => self.attack(1, 2),
            'x' if self.ammo > 0 => {
                self.ammo -= 1;
                self.attack(self.config.shot_range, 1)
            }
            _ => 0,
        };

        let taken = self.enemy_turn();
        self.player.health -= taken;

        let mut reward = self.config.step_penalty + dealt as f32 - 0.5 * taken as f32;
        let mut info = StepInfo {
            steps: self.steps,
            ..StepInfo::default()
        };

        let mut done = false;
        if self.enemy.health <= 0 {
            reward += self.config.kill_bonus;
            info.kills = 1;
            done = true;
        }
        if self.player.health <= 0 {
            reward += self.config.death_penalty;
            info.died = true;
            done = true;
        }
        if !done && self.steps >= self.config.max_steps {
            info.truncated = true;
            done = true;
        }

        Ok(StepResult {
            observation: self.observe(),
            reward,
            done,
            info,
        })
    }
}
