use std::time::Instant;

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
}

impl Frame {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Builds a frame filled with a single colour. Handy for fakes and placeholders.
    pub fn solid(width: u32, height: u32, color: [u8; 4]) -> Self {
        let mut rgba = Vec::with_capacity(width as usize * height as usize * 4);
        for _ in 0..(width as usize * height as usize) {
            rgba.extend_from_slice(&color);
        }
        Self {
            rgba,
            width,
            height,
            timestamp: Instant::now(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Lifecycle of a capture controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivityState {
    Idle,
    Starting,
    Active,
    Error,
}

impl ActivityState {
    pub fn label(&self) -> &'static str {
        match self {
            ActivityState::Idle => "idle",
            ActivityState::Starting => "starting",
            ActivityState::Active => "active",
            ActivityState::Error => "error",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub score: f32,
    pub joint: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handedness {
    Left,
    Right,
    Unknown,
}

impl Handedness {
    pub fn from_score(score: f32) -> Self {
        if !score.is_finite() {
            Handedness::Unknown
        } else if score >= 0.5 {
            Handedness::Right
        } else {
            Handedness::Left
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Handedness::Left => "left",
            Handedness::Right => "right",
            Handedness::Unknown => "unknown",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Hand {
    pub landmarks: Vec<Landmark>,
    pub score: f32,
    pub handedness: Handedness,
}

impl Hand {
    pub fn landmark(&self, joint: usize) -> Option<&Landmark> {
        self.landmarks.iter().find(|lm| lm.joint == joint)
    }
}
