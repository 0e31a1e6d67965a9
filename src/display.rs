//! On-screen preview window (SDL2).
//!
//! Shows each processed frame with the HUD already drawn in and reports
//! when the operator asks to quit (Escape, `q`, or closing the window).

use image::RgbImage;
use log::debug;
use sdl2::EventPump;
use sdl2::event::Event;
use sdl2::keyboard::Keycode;
use sdl2::pixels::PixelFormatEnum;
use sdl2::render::{TextureCreator, WindowCanvas};
use sdl2::video::WindowContext;

use crate::error::{Result, TurretError};

fn display_err(context: &str, e: impl std::fmt::Display) -> TurretError {
    TurretError::Display(format!("{context}: {e}"))
}

pub struct HudWindow {
    canvas: WindowCanvas,
    texture_creator: TextureCreator<WindowContext>,
    event_pump: EventPump,
    title: String,
    // Dropped last; the canvas and pump need a live context.
    _sdl_context: sdl2::Sdl,
}

impl HudWindow {
    pub fn open(title: &str, width: u32, height: u32) -> Result<Self> {
        let sdl_context = sdl2::init().map_err(|e| display_err("SDL init failed", e))?;
        let video_subsystem = sdl_context
            .video()
            .map_err(|e| display_err("Video subsystem init failed", e))?;

        let window = video_subsystem
            .window(title, width, height)
            .position_centered()
            .build()
            .map_err(|e| display_err("Failed to create window", e))?;

        let canvas = window
            .into_canvas()
            .build()
            .map_err(|e| display_err("Failed to create canvas", e))?;
        let texture_creator = canvas.texture_creator();

        let event_pump = sdl_context
            .event_pump()
            .map_err(|e| display_err("Failed to get event pump", e))?;

        Ok(Self {
            canvas,
            texture_creator,
            event_pump,
            title: title.to_string(),
            _sdl_context: sdl_context,
        })
    }

    /// Present one frame. Returns `false` once the operator asked to quit.
    pub fn show(&mut self, frame: &RgbImage, title: &str) -> Result<bool> {
        for event in self.event_pump.poll_iter() {
            match event {
                Event::Quit { .. }
                | Event::KeyDown {
                    keycode: Some(Keycode::Escape | Keycode::Q),
                    ..
                } => {
                    debug!("Quit key pressed");
                    return Ok(false);
                }
                _ => {}
            }
        }

        if title != self.title {
            self.canvas
                .window_mut()
                .set_title(title)
                .map_err(|e| display_err("Failed to set title", e))?;
            self.title = title.to_string();
        }

        // Frames can change size if the camera renegotiates, so the
        // texture is sized per frame.
        let mut texture = self
            .texture_creator
            .create_texture_streaming(PixelFormatEnum::RGB24, frame.width(), frame.height())
            .map_err(|e| display_err("Failed to create texture", e))?;
        texture
            .update(None, frame.as_raw(), (frame.width() * 3) as usize)
            .map_err(|e| display_err("Failed to update texture", e))?;

        self.canvas.clear();
        self.canvas
            .copy(&texture, None, None)
            .map_err(|e| display_err("Failed to copy texture", e))?;
        self.canvas.present();

        Ok(true)
    }
}
