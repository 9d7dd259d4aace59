//! Optional VMX codec loaded at runtime
//!
//! The compressed-video codec ships as a standalone dynamic library. It is
//! probed once on first use; if it is missing the sender falls back to raw
//! NV12 and the receiver reports VMX1 streams as undecodable. Nothing in
//! this crate links against it statically.

use libloading::Library;
use std::ffi::c_void;
use std::sync::OnceLock;

use crate::error::CodecError;

/// OMT SQ profile passed to `VMX_Create`
pub const VMX_PROFILE_OMT_SQ: i32 = 166;

/// BT.709 color space passed to `VMX_Create`
pub const VMX_COLORSPACE_BT709: i32 = 709;

const VMX_ERR_OK: i32 = 0;

#[repr(C)]
#[derive(Clone, Copy)]
struct VmxSize {
    width: i32,
    height: i32,
}

type CreateFn = unsafe extern "C" fn(VmxSize, i32, i32) -> *mut c_void;
type DestroyFn = unsafe extern "C" fn(*mut c_void);
type EncodeNv12Fn = unsafe extern "C" fn(*mut c_void, *const u8, i32, *const u8, i32, i32) -> i32;
type SaveToFn = unsafe extern "C" fn(*mut c_void, *mut u8, i32) -> i32;
type LoadFromFn = unsafe extern "C" fn(*mut c_void, *const u8, i32) -> i32;
type DecodeBgraFn = unsafe extern "C" fn(*mut c_void, *mut u8, i32) -> i32;
type GetThreadsFn = unsafe extern "C" fn(*mut c_void) -> i32;
type SetThreadsFn = unsafe extern "C" fn(*mut c_void, i32);

/// Resolved libvmx entry points. Lives for the whole process once loaded.
pub struct VmxLibrary {
    _lib: Library,
    create: CreateFn,
    destroy: DestroyFn,
    encode_nv12: EncodeNv12Fn,
    save_to: SaveToFn,
    load_from: Option<LoadFromFn>,
    decode_bgra: Option<DecodeBgraFn>,
    get_threads: Option<GetThreadsFn>,
    set_threads: Option<SetThreadsFn>,
}

// Function pointers into an immutable loaded library.
unsafe impl Send for VmxLibrary {}
unsafe impl Sync for VmxLibrary {}

const CANDIDATES: &[&str] = &["libvmx.so", "vmx.dll", "libvmx.dylib"];

impl VmxLibrary {
    fn load() -> Option<Self> {
        let lib = CANDIDATES.iter().find_map(|name| {
            match unsafe { Library::new(name) } {
                Ok(lib) => {
                    tracing::info!(%name, "loaded VMX codec library");
                    Some(lib)
                }
                Err(e) => {
                    tracing::debug!(%name, error = %e, "VMX candidate not loadable");
                    None
                }
            }
        })?;

        unsafe {
            let create = *lib.get::<CreateFn>(b"VMX_Create\0").ok()?;
            let destroy = *lib.get::<DestroyFn>(b"VMX_Destroy\0").ok()?;
            let encode_nv12 = *lib.get::<EncodeNv12Fn>(b"VMX_EncodeNV12\0").ok()?;
            let save_to = *lib.get::<SaveToFn>(b"VMX_SaveTo\0").ok()?;
            let load_from = lib.get::<LoadFromFn>(b"VMX_LoadFrom\0").ok().map(|s| *s);
            let decode_bgra = lib.get::<DecodeBgraFn>(b"VMX_DecodeBGRA\0").ok().map(|s| *s);
            let get_threads = lib.get::<GetThreadsFn>(b"VMX_GetThreads\0").ok().map(|s| *s);
            let set_threads = lib.get::<SetThreadsFn>(b"VMX_SetThreads\0").ok().map(|s| *s);

            tracing::info!(
                decode = load_from.is_some() && decode_bgra.is_some(),
                threads = set_threads.is_some(),
                "VMX symbols resolved"
            );

            Some(Self {
                _lib: lib,
                create,
                destroy,
                encode_nv12,
                save_to,
                load_from,
                decode_bgra,
                get_threads,
                set_threads,
            })
        }
    }

    pub fn supports_decode(&self) -> bool {
        self.load_from.is_some() && self.decode_bgra.is_some()
    }

    /// Create a codec instance and apply the requested thread count where
    /// the library exposes thread control.
    fn create_instance(&self, width: i32, height: i32, threads: i32) -> *mut c_void {
        let handle = unsafe {
            (self.create)(
                VmxSize { width, height },
                VMX_PROFILE_OMT_SQ,
                VMX_COLORSPACE_BT709,
            )
        };
        if !handle.is_null() && threads > 0 {
            if let Some(set_threads) = self.set_threads {
                unsafe { set_threads(handle, threads) };
                if let Some(get_threads) = self.get_threads {
                    let now = unsafe { get_threads(handle) };
                    tracing::debug!(width, height, threads = now, "VMX instance threads");
                }
            }
        }
        handle
    }
}

static LIBRARY: OnceLock<Option<VmxLibrary>> = OnceLock::new();

/// The process-wide library handle, probed on first call.
pub fn library() -> Option<&'static VmxLibrary> {
    LIBRARY.get_or_init(VmxLibrary::load).as_ref()
}

/// Whether a compressed codec backend is loaded.
pub fn available() -> bool {
    library().is_some()
}

/// Whether the loaded backend can also decode.
pub fn can_decode() -> bool {
    library().is_some_and(VmxLibrary::supports_decode)
}

/// Minimum encode output buffer for a frame size.
pub fn encode_buffer_len(width: usize, height: usize) -> usize {
    width * height * 2
}

/// VMX encoder fixed to one frame size
pub struct VmxEncoder {
    lib: &'static VmxLibrary,
    handle: *mut c_void,
    width: i32,
    height: i32,
}

// The handle is owned by exactly one thread at a time.
unsafe impl Send for VmxEncoder {}

impl VmxEncoder {
    pub fn new(width: i32, height: i32, threads: i32) -> Result<Self, CodecError> {
        let lib = library().ok_or(CodecError::Unavailable)?;
        let handle = lib.create_instance(width, height, threads);
        if handle.is_null() {
            return Err(CodecError::EncoderInit(format!(
                "VMX_Create failed for {width}x{height}"
            )));
        }
        Ok(Self {
            lib,
            handle,
            width,
            height,
        })
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    /// Encode one NV12 frame into `out`. Returns the compressed length.
    ///
    /// No allocation happens here; `out` must hold at least
    /// `width * height * 2` bytes.
    pub fn encode(
        &mut self,
        y: &[u8],
        y_stride: i32,
        uv: &[u8],
        uv_stride: i32,
        out: &mut [u8],
    ) -> Result<usize, CodecError> {
        let need = encode_buffer_len(self.width as usize, self.height as usize);
        if out.len() < need {
            return Err(CodecError::OutputTooSmall {
                need,
                have: out.len(),
            });
        }
        if y.len() < (y_stride as usize) * (self.height as usize)
            || uv.len() < (uv_stride as usize) * (self.height as usize / 2)
        {
            return Err(CodecError::EncodingFailed("plane shorter than stride".into()));
        }

        let err = unsafe {
            (self.lib.encode_nv12)(self.handle, y.as_ptr(), y_stride, uv.as_ptr(), uv_stride, 0)
        };
        if err != VMX_ERR_OK {
            return Err(CodecError::EncodingFailed(format!("VMX_EncodeNV12: {err}")));
        }

        let written =
            unsafe { (self.lib.save_to)(self.handle, out.as_mut_ptr(), out.len() as i32) };
        if written <= 0 || written as usize > out.len() {
            return Err(CodecError::EncodingFailed(format!("VMX_SaveTo: {written}")));
        }
        Ok(written as usize)
    }
}

impl Drop for VmxEncoder {
    fn drop(&mut self) {
        unsafe { (self.lib.destroy)(self.handle) };
    }
}

/// VMX decoder fixed to one frame size
pub struct VmxDecoder {
    lib: &'static VmxLibrary,
    handle: *mut c_void,
    width: i32,
    height: i32,
}

unsafe impl Send for VmxDecoder {}

impl VmxDecoder {
    pub fn new(width: i32, height: i32, threads: i32) -> Result<Self, CodecError> {
        let lib = library().ok_or(CodecError::Unavailable)?;
        if !lib.supports_decode() {
            return Err(CodecError::Unavailable);
        }
        let handle = lib.create_instance(width, height, threads);
        if handle.is_null() {
            return Err(CodecError::DecoderInit(format!(
                "VMX_Create failed for {width}x{height}"
            )));
        }
        Ok(Self {
            lib,
            handle,
            width,
            height,
        })
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    /// Decode a compressed frame into `out_rgba` (RGBA byte order, row
    /// stride `width * 4`).
    ///
    /// The library emits BGRA; the R/B swap happens in place before
    /// returning.
    pub fn decode(&mut self, data: &[u8], out_rgba: &mut [u8]) -> Result<(), CodecError> {
        let need = self.width as usize * self.height as usize * 4;
        if out_rgba.len() < need {
            return Err(CodecError::OutputTooSmall {
                need,
                have: out_rgba.len(),
            });
        }

        // Presence checked in `new`.
        let load_from = self.lib.load_from.ok_or(CodecError::Unavailable)?;
        let decode_bgra = self.lib.decode_bgra.ok_or(CodecError::Unavailable)?;

        let err = unsafe { load_from(self.handle, data.as_ptr(), data.len() as i32) };
        if err != VMX_ERR_OK {
            return Err(CodecError::DecodingFailed(format!("VMX_LoadFrom: {err}")));
        }

        let stride = self.width * 4;
        let err = unsafe { decode_bgra(self.handle, out_rgba.as_mut_ptr(), stride) };
        if err != VMX_ERR_OK {
            return Err(CodecError::DecodingFailed(format!("VMX_DecodeBGRA: {err}")));
        }

        super::convert::swap_red_blue_in_place(&mut out_rgba[..need]);
        Ok(())
    }
}

impl Drop for VmxDecoder {
    fn drop(&mut self) {
        unsafe { (self.lib.destroy)(self.handle) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The test environment has no libvmx; the adapter must degrade cleanly.

    #[test]
    fn test_absent_library_is_nonfatal() {
        if available() {
            return; // a real libvmx is installed; nothing to assert here
        }
        assert!(!can_decode());
        assert!(matches!(
            VmxEncoder::new(1920, 1080, 2),
            Err(CodecError::Unavailable)
        ));
        assert!(matches!(
            VmxDecoder::new(1920, 1080, 2),
            Err(CodecError::Unavailable)
        ));
    }

    #[test]
    fn test_encode_buffer_len() {
        assert_eq!(encode_buffer_len(1920, 1080), 1920 * 1080 * 2);
    }
}
