//! Render surfaces keyed by host texture id.
//!
//! The host registers one [`RenderSurface`] per texture. A pipeline takes an
//! exclusive [`SurfaceLease`] while it streams; dropping the lease clears the
//! surface and makes it available again.

use crate::error::{MediaError, Result};
use crate::video::frame::DecodedFrame;
use logging::Logger;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Destination for decoded frames (a texture, a platform view, a test sink).
pub trait RenderSurface: Send {
    fn present(&mut self, frame: &DecodedFrame) -> Result<()>;

    /// Called when the surface is unbound from a stream.
    fn clear(&mut self) {}
}

type SharedSurface = Arc<Mutex<Box<dyn RenderSurface>>>;

struct Slot {
    surface: SharedSurface,
    leased: bool,
}

/// Thread-safe map of texture ids to surfaces.
#[derive(Clone)]
pub struct SurfaceRegistry {
    slots: Arc<Mutex<HashMap<i64, Slot>>>,
    logger: Logger,
}

impl Default for SurfaceRegistry {
    fn default() -> Self {
        Self::new(Logger::disabled())
    }
}

impl SurfaceRegistry {
    pub fn new(logger: Logger) -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            logger,
        }
    }

    fn lock_slots(&self) -> MutexGuard<'_, HashMap<i64, Slot>> {
        self.slots.lock().unwrap_or_else(|poisoned| {
            self.logger.error("Surface registry mutex poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Registers (or replaces) the surface behind `texture_id`.
    ///
    /// # Errors
    ///
    /// `SurfaceBusy` if the current surface for that id is leased.
    pub fn register(&self, texture_id: i64, surface: Box<dyn RenderSurface>) -> Result<()> {
        let mut slots = self.lock_slots();
        if slots.get(&texture_id).is_some_and(|slot| slot.leased) {
            return Err(MediaError::SurfaceBusy(texture_id));
        }
        slots.insert(
            texture_id,
            Slot {
                surface: Arc::new(Mutex::new(surface)),
                leased: false,
            },
        );
        self.logger
            .debug(&format!("Registered render surface for texture {}", texture_id));
        Ok(())
    }

    /// Removes the surface. An active lease keeps presenting to it until
    /// released. Returns whether anything was registered.
    pub fn unregister(&self, texture_id: i64) -> bool {
        let removed = self.lock_slots().remove(&texture_id).is_some();
        if removed {
            self.logger
                .debug(&format!("Unregistered render surface for texture {}", texture_id));
        }
        removed
    }

    /// Takes exclusive use of the surface for `texture_id`.
    ///
    /// # Errors
    ///
    /// * `SurfaceNotRegistered` - the host never registered this id
    /// * `SurfaceBusy` - another stream holds the lease
    pub fn acquire(&self, texture_id: i64) -> Result<SurfaceLease> {
        let mut slots = self.lock_slots();
        let slot = slots
            .get_mut(&texture_id)
            .ok_or(MediaError::SurfaceNotRegistered(texture_id))?;
        if slot.leased {
            return Err(MediaError::SurfaceBusy(texture_id));
        }
        slot.leased = true;
        Ok(SurfaceLease {
            texture_id,
            surface: Arc::clone(&slot.surface),
            registry: self.clone(),
            released: false,
        })
    }

    /// Whether a stream currently renders into `texture_id`.
    pub fn is_bound(&self, texture_id: i64) -> bool {
        self.lock_slots()
            .get(&texture_id)
            .is_some_and(|slot| slot.leased)
    }

    pub fn is_registered(&self, texture_id: i64) -> bool {
        self.lock_slots().contains_key(&texture_id)
    }

    pub fn registered_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.lock_slots().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn release(&self, texture_id: i64, surface: &SharedSurface) {
        surface
            .lock()
            .unwrap_or_else(|poisoned| {
                self.logger.error("Render surface mutex poisoned, recovering");
                poisoned.into_inner()
            })
            .clear();

        let mut slots = self.lock_slots();
        // The id may have been re-registered with a different surface.
        if let Some(slot) = slots.get_mut(&texture_id)
            && Arc::ptr_eq(&slot.surface, surface)
        {
            slot.leased = false;
        }
        self.logger
            .debug(&format!("Released render surface for texture {}", texture_id));
    }
}

/// Exclusive handle on one registered surface.
pub struct SurfaceLease {
    texture_id: i64,
    surface: SharedSurface,
    registry: SurfaceRegistry,
    released: bool,
}

impl SurfaceLease {
    pub fn texture_id(&self) -> i64 {
        self.texture_id
    }

    /// Hands a frame to the surface.
    pub fn present(&self, frame: &DecodedFrame) -> Result<()> {
        let mut surface = self
            .surface
            .lock()
            .map_err(|_| MediaError::Surface("surface mutex poisoned".to_string()))?;
        surface.present(frame)
    }

    /// Clears the surface and returns it to the registry.
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.registry.release(self.texture_id, &self.surface);
        }
    }
}

impl Drop for SurfaceLease {
    fn drop(&mut self) {
        self.release_once();
    }
}

impl std::fmt::Debug for SurfaceLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceLease")
            .field("texture_id", &self.texture_id)
            .field("released", &self.released)
            .finish()
    }
}
