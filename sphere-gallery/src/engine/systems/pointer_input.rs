use crate::engine::orbit::orbit_controller::OrbitController;
use bevy::input::touch::Touches;
use bevy::prelude::*;
use bevy::window::{CursorLeft, PrimaryWindow};

/// Touch currently driving the orbit, if any. Other touches are ignored.
#[derive(Resource, Debug, Default)]
pub struct ActivePointer {
    touch: Option<u64>,
}

/// Feeds mouse and single-finger touch input to the orbit controller and keeps
/// the trackball sized to the window.
pub fn pointer_input(
    mouse: Res<ButtonInput<MouseButton>>,
    touches: Res<Touches>,
    windows: Query<&Window, With<PrimaryWindow>>,
    mut cursor_left: EventReader<CursorLeft>,
    mut active: ResMut<ActivePointer>,
    mut orbit: ResMut<OrbitController>,
) {
    let Ok(window) = windows.single() else {
        return;
    };
    orbit.set_viewport(Vec2::new(window.width(), window.height()));
    let left_window = cursor_left.read().count() > 0;

    if let Some(id) = active.touch {
        match touches.get_pressed(id) {
            Some(touch) => orbit.pointer_move(touch.position()),
            None => {
                orbit.pointer_up();
                active.touch = None;
            }
        }
        return;
    }
    if let Some(touch) = touches.iter_just_pressed().next() {
        active.touch = Some(touch.id());
        orbit.pointer_down(touch.position());
        return;
    }

    let cursor = window.cursor_position();
    if mouse.just_pressed(MouseButton::Left) {
        if let Some(position) = cursor {
            orbit.pointer_down(position);
        }
    } else if mouse.pressed(MouseButton::Left) {
        if let Some(position) = cursor {
            orbit.pointer_move(position);
        }
    }

    if mouse.just_released(MouseButton::Left) || left_window {
        orbit.pointer_up();
    }
}
