//! Interface to the world-owning collaborator.
//!
//! The protocol core routes actions in and snapshots out; what a move does
//! to the grid is not its business. [`GridWorld`] is the minimal
//! implementation backing the binary and the tests: agents on an empty
//! bounded grid, no cell semantics, no pathing.

use log::info;
use shared::Action;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// What the protocol layer needs from the world.
pub trait World: Send + Sync {
    /// One-time switch flipped when the first client reports ready.
    fn set_running(&self, running: bool);

    /// Adds an agent for a newly connected client.
    fn spawn_agent(&self, client_id: u32);

    /// Removes a disconnected client's agent.
    fn despawn_agent(&self, client_id: u32);

    /// Applies one tick's aggregated actions.
    fn apply_batch(&self, batch: &[(u32, Action)]);

    /// Renders the current state as an opaque snapshot payload.
    fn render_snapshot(&self) -> String;
}

struct GridState {
    running: bool,
    agents: BTreeMap<u32, (usize, usize)>,
    items: Vec<(usize, usize)>,
}

/// Demo world: a bordered ASCII grid with one symbol per agent.
pub struct GridWorld {
    width: usize,
    height: usize,
    state: Mutex<GridState>,
}

impl GridWorld {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            state: Mutex::new(GridState {
                running: false,
                agents: BTreeMap::new(),
                items: vec![(width / 2, height / 2)],
            }),
        }
    }

    fn symbol(client_id: u32) -> char {
        // Single-digit ids read nicely in the frame; everyone else is '*'.
        if client_id < 10 {
            char::from_digit(client_id, 10).unwrap_or('*')
        } else {
            '*'
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GridState> {
        // Grid state is plain data; a poisoned lock means a panic already
        // took the process down a different path.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl World for GridWorld {
    fn set_running(&self, running: bool) {
        self.lock().running = running;
        info!("world running: {}", running);
    }

    fn spawn_agent(&self, client_id: u32) {
        let mut state = self.lock();
        let x = (client_id as usize * 2) % self.width;
        let y = (client_id as usize) % self.height;
        state.agents.insert(client_id, (x, y));
        info!("agent {} spawned at ({}, {})", client_id, x, y);
    }

    fn despawn_agent(&self, client_id: u32) {
        if self.lock().agents.remove(&client_id).is_some() {
            info!("agent {} despawned", client_id);
        }
    }

    fn apply_batch(&self, batch: &[(u32, Action)]) {
        let mut state = self.lock();
        if !state.running {
            return;
        }

        for (client_id, action) in batch {
            if let Some((x, y)) = state.agents.get_mut(client_id) {
                match action {
                    Action::Up => *y = y.saturating_sub(1),
                    Action::Down => *y = (*y + 1).min(self.height - 1),
                    Action::Left => *x = x.saturating_sub(1),
                    Action::Right => *x = (*x + 1).min(self.width - 1),
                    Action::Quit | Action::Disconnect => {}
                }
            }
        }
    }

    fn render_snapshot(&self) -> String {
        let state = self.lock();

        let mut rows = vec![vec!['.'; self.width]; self.height];
        for (x, y) in &state.items {
            rows[*y][*x] = '+';
        }
        for (client_id, (x, y)) in &state.agents {
            rows[*y][*x] = Self::symbol(*client_id);
        }

        let mut frame = String::new();
        frame.push('+');
        frame.push_str(&"-".repeat(self.width));
        frame.push_str("+\n");
        for row in rows {
            frame.push('|');
            frame.extend(row);
            frame.push_str("|\n");
        }
        frame.push('+');
        frame.push_str(&"-".repeat(self.width));
        frame.push_str("+\n");
        frame
    }
}
