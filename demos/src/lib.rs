//! # Thistle Demos
//!
//! Frame loops driving the present-task graph on the software backend.
//!
//! ## Available Demos
//!
//! - `metaball_demo` - Animated metaball field, marching-cubes mesh and a
//!   control overlay, composed into one frame task per frame

use glam::{Vec2, Vec3};
use thistle_graphics::producers::{Control, Metaball};

/// Demos library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Seconds per animation frame.
pub const FRAME_TIME: f32 = 1.0 / 60.0;

/// Metaball `index` of `count` at `time` seconds.
///
/// Balls orbit the origin on tilted circles with different periods, so the
/// field changes every frame and occasionally merges.
pub fn orbiting_metaball(index: usize, count: usize, time: f32) -> Metaball {
    let phase = index as f32 / count.max(1) as f32 * std::f32::consts::TAU;
    let speed = 0.6 + 0.25 * index as f32;
    let angle = phase + time * speed;
    let tilt = 0.35 * (phase * 0.5).sin();
    let center = Vec3::new(angle.cos() * 0.45, tilt * angle.sin(), angle.sin() * 0.45);
    Metaball::new(center, 0.22 + 0.04 * (index % 3) as f32)
}

/// One horizontal bar per metaball, its length tracking the ball's height.
pub fn height_bars(metaballs: &[Metaball], width: u32, height: u32) -> Vec<Control> {
    let rows = metaballs.len().max(1) as f32;
    let row = height as f32 / rows;
    metaballs
        .iter()
        .enumerate()
        .map(|(i, ball)| {
            let fill = ((ball.center.y + 1.0) * 0.5).clamp(0.0, 1.0);
            Control::new(
                Vec2::new(2.0, i as f32 * row + 1.0),
                Vec2::new((width as f32 - 4.0) * fill, (row - 2.0).max(1.0)),
                [0.3 + 0.7 * fill, 0.4, 1.0 - 0.7 * fill, 0.85],
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orbit_stays_inside_field() {
        for i in 0..8 {
            for frame in 0..240 {
                let ball = orbiting_metaball(i, 8, frame as f32 * FRAME_TIME);
                assert!(ball.center.abs().max_element() + ball.radius < 1.0);
            }
        }
    }

    #[test]
    fn test_orbit_moves() {
        let a = orbiting_metaball(0, 1, 0.0);
        let b = orbiting_metaball(0, 1, FRAME_TIME);
        assert_ne!(a.center, b.center);
    }

    #[test]
    fn test_height_bars_fit_target() {
        let balls: Vec<_> = (0..4).map(|i| orbiting_metaball(i, 4, 1.0)).collect();
        let bars = height_bars(&balls, 128, 32);
        assert_eq!(bars.len(), 4);
        for bar in &bars {
            assert!(bar.position.x + bar.size.x <= 128.0);
            assert!(bar.position.y + bar.size.y <= 32.0);
        }
    }
}
