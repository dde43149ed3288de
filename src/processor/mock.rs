use std::{f64::consts::PI, time::Duration};

use rand::{Rng, SeedableRng, rngs::StdRng};

use super::FrameProcessor;
use crate::{
    error::CaptureResult,
    skeleton::{FINGER_BASES, NUM_LANDMARKS, joints},
    types::{Frame, Hand, Handedness, Landmark},
};

// Distance of each finger joint from the palm centre, as a fraction of finger length.
// The second joint sits at the finger midpoint.
const JOINT_FRACTIONS: [f64; 4] = [0.3, 0.55, 0.78, 1.0];
const FINGER_SPACING: f64 = PI / 4.0;

/// Animated stand-in for a detector. Hand count is rerolled on every processed frame.
pub struct MockProcessor {
    max_hands: usize,
    rng: StdRng,
}

impl MockProcessor {
    pub fn new(max_hands: usize) -> Self {
        Self::with_rng(max_hands, StdRng::from_entropy())
    }

    pub fn with_seed(max_hands: usize, seed: u64) -> Self {
        Self::with_rng(max_hands, StdRng::seed_from_u64(seed))
    }

    fn with_rng(max_hands: usize, rng: StdRng) -> Self {
        Self {
            max_hands: max_hands.max(1),
            rng,
        }
    }
}

impl FrameProcessor for MockProcessor {
    fn ensure_ready(&mut self) -> CaptureResult<()> {
        Ok(())
    }

    fn process(&mut self, frame: &Frame, elapsed: Duration) -> CaptureResult<Vec<Hand>> {
        let count = self.rng.gen_range(1..=self.max_hands);
        Ok((0..count)
            .map(|hand_index| simulate_hand(elapsed, hand_index, frame.width, frame.height))
            .collect())
    }

    fn label(&self) -> &'static str {
        "simulated"
    }
}

/// Landmarks of one simulated hand. A pure function of its inputs.
pub fn simulate_hand(elapsed: Duration, hand_index: usize, width: u32, height: u32) -> Hand {
    let t = elapsed.as_secs_f64();
    let phase = hand_index as f64;
    let (w, h) = (width as f64, height as f64);
    let reach = w.min(h);

    let palm_x = w * (0.35 + 0.3 * phase) + (t * 1.3 + phase * PI).sin() * w * 0.08;
    let palm_y = h * 0.55 + (t * 0.9 + phase).cos() * h * 0.06;

    let mut landmarks = Vec::with_capacity(NUM_LANDMARKS);
    landmarks.push(point(joints::WRIST, palm_x, palm_y + reach * 0.12));

    for (finger, &base_joint) in FINGER_BASES.iter().enumerate() {
        let f = finger as f64;
        let wobble = (t * 3.0 + f + phase).sin() * 0.15;
        let angle = PI + f * FINGER_SPACING + wobble;
        let length = reach * (0.22 + 0.04 * (t * 2.0 + f * 0.7 + phase).sin());
        let (dx, dy) = (angle.cos(), angle.sin());

        for (step, fraction) in JOINT_FRACTIONS.iter().enumerate() {
            landmarks.push(point(
                base_joint + step,
                palm_x + dx * length * fraction,
                palm_y + dy * length * fraction,
            ));
        }
    }

    Hand {
        landmarks,
        score: 1.0,
        handedness: if hand_index % 2 == 0 {
            Handedness::Right
        } else {
            Handedness::Left
        },
    }
}

fn point(joint: usize, x: f64, y: f64) -> Landmark {
    Landmark {
        x: x as f32,
        y: y as f32,
        score: 1.0,
        joint,
    }
}
