//! C ABI for linking the engine as a static library from the Android NDK.
//!
//! The engine is an opaque handle. Operations return `0` once queued, or a
//! positive [`ErrorCode::as_i32`] for bad arguments or a full command queue.
//! Their outcomes, like every [`SessionEvent`], are read as JSON with
//! [`p2p_poll_event`].

use crate::bridge::{EventStream, P2pVideoEngine};
use crate::error::{ErrorCode, FailureReport};
use crate::session::{CommandTicket, SessionEvent};
use media::{DecodedFrame, PixelFormat, RenderSurface};
use serde::Serialize;
use std::collections::VecDeque;
use std::ffi::{CStr, c_char, c_void};
use std::os::raw::c_int;
use std::path::Path;

/// Called with every frame presented on a registered surface.
/// `format` is 0 for Annex-B, 1 for I420.
pub type FrameCallback = extern "C" fn(
    user_data: *mut c_void,
    data: *const u8,
    len: usize,
    width: u32,
    height: u32,
    format: c_int,
    pts: u32,
);

struct CallbackSurface {
    callback: FrameCallback,
    user_data: *mut c_void,
}

// The host promises `user_data` may be used from the present thread.
unsafe impl Send for CallbackSurface {}

impl RenderSurface for CallbackSurface {
    fn present(&mut self, frame: &DecodedFrame) -> media::Result<()> {
        let format = match frame.format {
            PixelFormat::AnnexB => 0,
            PixelFormat::I420 => 1,
        };
        (self.callback)(
            self.user_data,
            frame.data.as_ptr(),
            frame.data.len(),
            frame.width,
            frame.height,
            format,
            frame.pts,
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct CommandResult<'a> {
    event: &'static str,
    operation: &'a str,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

struct FfiEngine {
    engine: P2pVideoEngine,
    events: Option<EventStream>,
    pending: Vec<(&'static str, CommandTicket)>,
    /// Serialized events not yet handed to the host.
    outbox: VecDeque<String>,
}

impl FfiEngine {
    fn track(&mut self, operation: &'static str, mut ticket: CommandTicket) -> c_int {
        // Only a full queue rejects before the manager sees the command.
        if let Some(Err(report)) = ticket.try_result()
            && report.code == ErrorCode::EngineBusy
        {
            return report.code.as_i32();
        }
        self.pending.push((operation, ticket));
        0
    }

    fn collect(&mut self) {
        let mut still_pending = Vec::with_capacity(self.pending.len());
        for (operation, mut ticket) in self.pending.drain(..) {
            match ticket.try_result() {
                Some(outcome) => {
                    let (code, message) = match outcome {
                        Ok(()) => (None, None),
                        Err(FailureReport { code, message }) => (Some(code), Some(message)),
                    };
                    let result = CommandResult {
                        event: "command_result",
                        operation,
                        ok: code.is_none(),
                        code,
                        message,
                    };
                    if let Ok(json) = serde_json::to_string(&result) {
                        self.outbox.push_back(json);
                    }
                }
                None => still_pending.push((operation, ticket)),
            }
        }
        self.pending = still_pending;

        if let Some(events) = &self.events {
            while let Ok(event) = events.try_next() {
                if let Ok(json) = serde_json::to_string::<SessionEvent>(&event) {
                    self.outbox.push_back(json);
                }
            }
        }
    }
}

fn engine_mut<'a>(h: *mut c_void) -> Option<&'a mut FfiEngine> {
    if h.is_null() {
        return None;
    }
    Some(unsafe { &mut *(h as *mut FfiEngine) })
}

fn c_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().ok()
}

fn invalid_argument() -> c_int {
    ErrorCode::InvalidArgument.as_i32()
}

/// Creates an engine from the JSON config at `config_path`, or from the
/// searched `p2p_video.json` (defaults if absent) when null. Returns null
/// on failure.
#[unsafe(no_mangle)]
pub extern "C" fn p2p_engine_create(config_path: *const c_char) -> *mut c_void {
    let path = match config_path.is_null() {
        true => None,
        false => match c_str(config_path) {
            Some(path) => Some(Path::new(path)),
            None => return std::ptr::null_mut(),
        },
    };
    let mut engine = match P2pVideoEngine::from_config_file(path) {
        Ok(engine) => engine,
        Err(_) => return std::ptr::null_mut(),
    };
    let events = engine.events();
    Box::into_raw(Box::new(FfiEngine {
        engine,
        events,
        pending: Vec::new(),
        outbox: VecDeque::new(),
    })) as *mut c_void
}

/// Stops everything and frees the engine. No-op if `h` is null.
#[unsafe(no_mangle)]
pub extern "C" fn p2p_engine_destroy(h: *mut c_void) {
    if h.is_null() {
        return;
    }
    let mut engine = unsafe { Box::from_raw(h as *mut FfiEngine) };
    engine.engine.shutdown();
}

#[unsafe(no_mangle)]
pub extern "C" fn p2p_init_mqtt(h: *mut c_void, phone_id: *const c_char) -> c_int {
    let (Some(engine), Some(phone_id)) = (engine_mut(h), c_str(phone_id)) else {
        return invalid_argument();
    };
    let ticket = engine.engine.init_mqtt(phone_id);
    engine.track("initMqtt", ticket)
}

#[unsafe(no_mangle)]
pub extern "C" fn p2p_set_dev_p2p(h: *mut c_void, device_id: *const c_char) -> c_int {
    let (Some(engine), Some(device_id)) = (engine_mut(h), c_str(device_id)) else {
        return invalid_argument();
    };
    let ticket = engine.engine.set_dev_p2p(device_id);
    engine.track("setDevP2p", ticket)
}

#[unsafe(no_mangle)]
pub extern "C" fn p2p_start_p2p_video(
    h: *mut c_void,
    device_id: *const c_char,
    display_mode: c_int,
    texture_id: i64,
    decode_mode: c_int,
) -> c_int {
    let (Some(engine), Some(device_id)) = (engine_mut(h), c_str(device_id)) else {
        return invalid_argument();
    };
    let ticket = engine
        .engine
        .start_p2p_video(device_id, display_mode, texture_id, decode_mode);
    engine.track("startP2pVideo", ticket)
}

#[unsafe(no_mangle)]
pub extern "C" fn p2p_stop_p2p_video(h: *mut c_void) -> c_int {
    let Some(engine) = engine_mut(h) else {
        return invalid_argument();
    };
    let ticket = engine.engine.stop_p2p_video();
    engine.track("stopP2pVideo", ticket)
}

#[unsafe(no_mangle)]
pub extern "C" fn p2p_deinit_mqtt(h: *mut c_void) -> c_int {
    let Some(engine) = engine_mut(h) else {
        return invalid_argument();
    };
    let ticket = engine.engine.deinit_mqtt();
    engine.track("deinitMqtt", ticket)
}

/// `topic` may be null or empty to address the bound peer.
#[unsafe(no_mangle)]
pub extern "C" fn p2p_send_json_msg(h: *mut c_void, json: *const c_char, topic: *const c_char) -> c_int {
    let (Some(engine), Some(json)) = (engine_mut(h), c_str(json)) else {
        return invalid_argument();
    };
    let topic = if topic.is_null() {
        ""
    } else {
        match c_str(topic) {
            Some(topic) => topic,
            None => return invalid_argument(),
        }
    };
    let ticket = engine.engine.send_json_msg(json, topic);
    engine.track("sendJsonMsg", ticket)
}

/// Registers a callback-backed render surface for `texture_id`.
#[unsafe(no_mangle)]
pub extern "C" fn p2p_register_surface(
    h: *mut c_void,
    texture_id: i64,
    callback: Option<FrameCallback>,
    user_data: *mut c_void,
) -> c_int {
    let (Some(engine), Some(callback)) = (engine_mut(h), callback) else {
        return invalid_argument();
    };
    let surface = CallbackSurface {
        callback,
        user_data,
    };
    match engine.engine.surfaces().register(texture_id, Box::new(surface)) {
        Ok(()) => 0,
        Err(_) => ErrorCode::SurfaceUnavailable.as_i32(),
    }
}

/// Returns 1 if a surface was removed, 0 otherwise.
#[unsafe(no_mangle)]
pub extern "C" fn p2p_unregister_surface(h: *mut c_void, texture_id: i64) -> c_int {
    let Some(engine) = engine_mut(h) else {
        return invalid_argument();
    };
    engine.engine.surfaces().unregister(texture_id) as c_int
}

/// Copies the next event as NUL-terminated JSON into `buf`.
///
/// Returns the JSON length, `0` when there is no event, or `-n` when `buf`
/// needs `n` bytes (the event stays queued).
#[unsafe(no_mangle)]
pub extern "C" fn p2p_poll_event(h: *mut c_void, buf: *mut c_char, cap: usize) -> c_int {
    let Some(engine) = engine_mut(h) else {
        return -1;
    };
    if buf.is_null() {
        return -1;
    }
    engine.collect();
    let Some(json) = engine.outbox.front() else {
        return 0;
    };
    let needed = json.len() + 1;
    if needed > cap {
        return -(needed as c_int);
    }
    unsafe {
        let out = buf as *mut u8;
        out.copy_from_nonoverlapping(json.as_ptr(), json.len());
        *out.add(json.len()) = 0;
    }
    let written = json.len() as c_int;
    engine.outbox.pop_front();
    written
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::{Duration, Instant};

    fn engine_with_temp_config() -> *mut c_void {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        let log = dir.path().join("engine.log");
        std::fs::write(
            &path,
            format!(
                r#"{{"logging": {{"log_file_path": "{}", "enable_console": false}}}}"#,
                log.display()
            ),
        )
        .unwrap();
        let path = CString::new(path.to_string_lossy().into_owned()).unwrap();
        p2p_engine_create(path.as_ptr())
    }

    fn poll_until(h: *mut c_void, needle: &str) -> String {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut buf = vec![0 as c_char; 1024];
        while Instant::now() < deadline {
            let n = p2p_poll_event(h, buf.as_mut_ptr(), buf.len());
            if n > 0 {
                let json = unsafe { CStr::from_ptr(buf.as_ptr()) }.to_str().unwrap().to_string();
                if json.contains(needle) {
                    return json;
                }
            } else {
                thread::sleep(Duration::from_millis(10));
            }
        }
        panic!("no event containing {}", needle);
    }

    #[test]
    fn test_null_handles_are_rejected() {
        assert_eq!(p2p_stop_p2p_video(std::ptr::null_mut()), invalid_argument());
        assert_eq!(p2p_poll_event(std::ptr::null_mut(), std::ptr::null_mut(), 0), -1);
        p2p_engine_destroy(std::ptr::null_mut());
    }

    #[test]
    fn test_bad_config_path_gives_null() {
        let path = CString::new("/nonexistent/dir/engine.json").unwrap();
        assert!(p2p_engine_create(path.as_ptr()).is_null());
    }

    #[test]
    fn test_command_results_are_polled_as_json() {
        let h = engine_with_temp_config();
        assert!(!h.is_null());

        assert_eq!(p2p_stop_p2p_video(h), 0);
        let json = poll_until(h, "stopP2pVideo");
        assert!(json.contains(r#""ok":true"#));

        let device = CString::new("devA").unwrap();
        assert_eq!(p2p_set_dev_p2p(h, device.as_ptr()), 0);
        let json = poll_until(h, "setDevP2p");
        assert!(json.contains("INVALID_STATE"));

        p2p_engine_destroy(h);
    }

    #[test]
    fn test_small_buffer_reports_needed_size() {
        let h = engine_with_temp_config();
        assert_eq!(p2p_stop_p2p_video(h), 0);

        let mut tiny = vec![0 as c_char; 4];
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut needed = 0;
        while Instant::now() < deadline {
            needed = p2p_poll_event(h, tiny.as_mut_ptr(), tiny.len());
            if needed != 0 {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert!(needed < 0);

        let mut buf = vec![0 as c_char; (-needed) as usize];
        assert_eq!(p2p_poll_event(h, buf.as_mut_ptr(), buf.len()), -needed - 1);
        p2p_engine_destroy(h);
    }

    static FRAMES: AtomicUsize = AtomicUsize::new(0);

    extern "C" fn count_frame(_: *mut c_void, _: *const u8, len: usize, _: u32, _: u32, _: c_int, _: u32) {
        FRAMES.fetch_add(len, Ordering::SeqCst);
    }

    #[test]
    fn test_callback_surface() {
        let mut surface = CallbackSurface {
            callback: count_frame,
            user_data: std::ptr::null_mut(),
        };
        let frame = DecodedFrame {
            width: 2,
            height: 2,
            format: PixelFormat::AnnexB,
            data: vec![1, 2, 3],
            pts: 0,
        };
        surface.present(&frame).unwrap();
        assert_eq!(FRAMES.load(Ordering::SeqCst), 3);
    }
}
