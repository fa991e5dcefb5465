//! Placement of concurrently open browser windows

use std::collections::HashSet;

use rand::Rng;

const RESERVED_BOTTOM: u32 = 80;
const RANDOM_MARGIN: u32 = 50;
const MIN_SEPARATION: i64 = 50;
const RANDOM_TRIES: usize = 50;

/// Top-left corner and size of a browser window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowPlacement {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Hands out window positions: a grid first, then random spots kept
/// clear of windows already placed.
#[derive(Debug, Clone)]
pub struct WindowLayout {
    screen_width: u32,
    screen_height: u32,
    window_width: u32,
    window_height: u32,
    padding: u32,
    used: HashSet<(u32, u32)>,
}

impl WindowLayout {
    pub const WINDOW_WIDTH: u32 = 600;
    pub const WINDOW_HEIGHT: u32 = 400;
    pub const PADDING: u32 = 10;

    pub fn new(screen_width: u32, screen_height: u32) -> Self {
        Self {
            screen_width,
            screen_height,
            window_width: Self::WINDOW_WIDTH,
            window_height: Self::WINDOW_HEIGHT,
            padding: Self::PADDING,
            used: HashSet::new(),
        }
    }

    fn usable_height(&self) -> u32 {
        self.screen_height.saturating_sub(RESERVED_BOTTOM)
    }

    fn columns(&self) -> u32 {
        (self.screen_width / (self.window_width + self.padding)).max(1)
    }

    fn rows(&self) -> u32 {
        (self.usable_height() / (self.window_height + self.padding)).max(1)
    }

    pub fn grid_slots(&self) -> usize {
        (self.columns() * self.rows()) as usize
    }

    /// Position for the window of the `index`-th concurrently processed item
    pub fn place(&mut self, index: usize) -> WindowPlacement {
        let (x, y) = if index < self.grid_slots() {
            let cols = self.columns() as usize;
            let (row, col) = (index / cols, index % cols);
            (
                col as u32 * (self.window_width + self.padding),
                row as u32 * (self.window_height + self.padding),
            )
        } else {
            self.random_position()
        };

        self.used.insert((x, y));
        WindowPlacement {
            x,
            y,
            width: self.window_width,
            height: self.window_height,
        }
    }

    /// Tries a bounded number of random spots; keeps the last one if none is clear
    fn random_position(&self) -> (u32, u32) {
        let mut rng = rand::thread_rng();
        let span = |screen: u32, window: u32| {
            let lo = RANDOM_MARGIN;
            let hi = screen.saturating_sub(window + RANDOM_MARGIN).max(lo);
            lo..=hi
        };
        let xs = span(self.screen_width, self.window_width);
        let ys = span(self.usable_height(), self.window_height);

        let mut candidate = (*xs.start(), *ys.start());
        for _ in 0..RANDOM_TRIES {
            candidate = (rng.gen_range(xs.clone()), rng.gen_range(ys.clone()));
            let clear = self.used.iter().all(|&(ux, uy)| {
                let apart = |a: u32, b: u32| (i64::from(a) - i64::from(b)).abs() > MIN_SEPARATION;
                apart(candidate.0, ux) || apart(candidate.1, uy)
            });
            if clear {
                break;
            }
        }
        candidate
    }

    /// Forgets every placed window, for the start of a new run
    pub fn reset(&mut self) {
        self.used.clear();
    }
}
