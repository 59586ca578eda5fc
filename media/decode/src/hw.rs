/*!
    Hardware acceleration support.

    Hardware decoding produces frames in device memory; the [`Accelerator`]
    seam moves them back into system memory after decode. A transfer failure
    latches the accelerator as failed, which the decoder surfaces as a
    restart request so the caller can rebuild on the software path.
*/

use std::ptr;

use ffmpeg_next::{ffi, frame};

use media_types::{Error, Result};

use crate::config::HwDevice;

/**
    Post-decode hook for hardware-backed frames.

    Implementations copy device-memory frames into system memory in place.
    Frames that are already in system memory pass through untouched.
*/
pub trait Accelerator: Send {
    /// Name of the acceleration backend, for diagnostics.
    fn name(&self) -> &str;

    /// Whether a previous transfer failed; once set it never clears.
    fn has_failed(&self) -> bool;

    /// Move the frame's data into system memory if it is device-backed.
    fn extract_data(&mut self, frame: &mut frame::Video) -> Result<()>;
}

/**
    Hardware device context wrapper.
*/
pub(crate) struct HwDeviceContext {
    ctx: *mut ffi::AVBufferRef,
}

impl HwDeviceContext {
    /**
        Try to create a hardware device context.

        Returns None if hardware acceleration is not available.
    */
    pub fn try_create(device: Option<HwDevice>) -> Option<(Self, &'static str)> {
        let (device_type, name) = device_type_for(device)?;

        unsafe {
            let mut hw_device_ctx: *mut ffi::AVBufferRef = ptr::null_mut();
            let ret = ffi::av_hwdevice_ctx_create(
                &mut hw_device_ctx,
                device_type,
                ptr::null(),
                ptr::null_mut(),
                0,
            );

            if ret < 0 || hw_device_ctx.is_null() {
                return None;
            }

            Some((Self { ctx: hw_device_ctx }, name))
        }
    }

    /**
        Create a reference to the context for use in a decoder.
    */
    pub fn create_ref(&self) -> *mut ffi::AVBufferRef {
        unsafe { ffi::av_buffer_ref(self.ctx) }
    }
}

impl Drop for HwDeviceContext {
    fn drop(&mut self) {
        if !self.ctx.is_null() {
            unsafe {
                ffi::av_buffer_unref(&mut self.ctx);
            }
        }
    }
}

// SAFETY: The FFmpeg buffer reference is internally reference-counted
// and thread-safe for the operations we perform.
unsafe impl Send for HwDeviceContext {}

#[cfg(target_os = "macos")]
fn device_type_for(device: Option<HwDevice>) -> Option<(ffi::AVHWDeviceType, &'static str)> {
    // On macOS, default to VideoToolbox
    match device {
        Some(HwDevice::VideoToolbox) | None => Some((
            ffi::AVHWDeviceType::AV_HWDEVICE_TYPE_VIDEOTOOLBOX,
            "videotoolbox",
        )),
        _ => None,
    }
}

#[cfg(target_os = "linux")]
fn device_type_for(device: Option<HwDevice>) -> Option<(ffi::AVHWDeviceType, &'static str)> {
    match device {
        Some(HwDevice::Vaapi) | None => {
            Some((ffi::AVHWDeviceType::AV_HWDEVICE_TYPE_VAAPI, "vaapi"))
        }
        Some(HwDevice::Cuda) => Some((ffi::AVHWDeviceType::AV_HWDEVICE_TYPE_CUDA, "cuda")),
        Some(HwDevice::Qsv) => Some((ffi::AVHWDeviceType::AV_HWDEVICE_TYPE_QSV, "qsv")),
        _ => None,
    }
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
fn device_type_for(_device: Option<HwDevice>) -> Option<(ffi::AVHWDeviceType, &'static str)> {
    None
}

/**
    Hardware acceleration backed by an FFmpeg hardware device context.
*/
pub struct HardwareAccel {
    device: HwDeviceContext,
    name: &'static str,
    failed: bool,
}

impl HardwareAccel {
    /**
        Try to initialize hardware acceleration for the given device, or the
        platform default when `device` is `None`.
    */
    pub fn try_new(device: Option<HwDevice>) -> Option<Self> {
        let (device, name) = HwDeviceContext::try_create(device)?;
        Some(Self {
            device,
            name,
            failed: false,
        })
    }

    /**
        A new reference to the device context, for binding to a codec
        context's `hw_device_ctx`. The caller owns the returned reference.
    */
    pub(crate) fn device_ref(&self) -> *mut ffi::AVBufferRef {
        self.device.create_ref()
    }
}

impl Accelerator for HardwareAccel {
    fn name(&self) -> &str {
        self.name
    }

    fn has_failed(&self) -> bool {
        self.failed
    }

    fn extract_data(&mut self, frame: &mut frame::Video) -> Result<()> {
        if !is_hw_frame(frame) {
            return Ok(());
        }

        match transfer_hw_frame(frame) {
            Ok(sw_frame) => {
                *frame = sw_frame;
                Ok(())
            }
            Err(e) => {
                self.failed = true;
                Err(Error::codec(format!(
                    "hardware frame transfer failed ({}): {e}",
                    self.name
                )))
            }
        }
    }
}

/**
    Check if a frame is a hardware frame that needs transfer.
*/
fn is_hw_frame(frame: &frame::Video) -> bool {
    let format = unsafe { (*frame.as_ptr()).format };
    format == ffi::AVPixelFormat::AV_PIX_FMT_VIDEOTOOLBOX as i32
        || format == ffi::AVPixelFormat::AV_PIX_FMT_VAAPI as i32
        || format == ffi::AVPixelFormat::AV_PIX_FMT_CUDA as i32
        || format == ffi::AVPixelFormat::AV_PIX_FMT_QSV as i32
}

/**
    Transfer a hardware frame to a software frame.
*/
fn transfer_hw_frame(hw_frame: &frame::Video) -> std::result::Result<frame::Video, ffmpeg_next::Error> {
    unsafe {
        let mut sw_frame = frame::Video::empty();
        let ret = ffi::av_hwframe_transfer_data(sw_frame.as_mut_ptr(), hw_frame.as_ptr(), 0);

        if ret < 0 {
            return Err(ffmpeg_next::Error::from(ret));
        }

        // Copy PTS from hardware frame
        (*sw_frame.as_mut_ptr()).pts = (*hw_frame.as_ptr()).pts;

        Ok(sw_frame)
    }
}
