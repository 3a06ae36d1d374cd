use std::ffi::c_void;

use windows::{
    core::{IUnknown, IUnknown_Vtbl, Interface, HRESULT},
    Win32::{
        Foundation::{BOOL, POINT, RECT},
        Graphics::{
            Direct3D11::{ID3D11Device, ID3D11DeviceContext},
            Dxgi::{
                Common::{DXGI_COLOR_SPACE_TYPE, DXGI_FORMAT, DXGI_RATIONAL},
                IDXGISwapChain, IDXGISwapChain1, IDXGISwapChain2, IDXGISwapChain3,
                IDXGISwapChain4, DXGI_FRAME_STATISTICS, DXGI_HDR_METADATA_TYPE, DXGI_MODE_DESC,
                DXGI_PRESENT_PARAMETERS, DXGI_SWAP_CHAIN_DESC,
            },
        },
    },
};

use crate::{
    present::{
        BufferDesc, FrameStatistics, ModeDesc, PresentFlags, PresentParameters,
        PresentationTarget, RawInterface, Status, SwapChainVersion,
    },
    system::time::Nanoseconds,
};

/// A DXGI swap chain exposed as a [`PresentationTarget`].
///
/// Flushing goes to the immediate context when the swap chain was created on
/// a D3D11 device. D3D12 queues have nothing to flush.
pub struct DxgiSwapChain {
    swap_chain: IDXGISwapChain,
    version: SwapChainVersion,
    revisions: Revisions,
    immediate_context: Option<ID3D11DeviceContext>,
}

#[derive(Default)]
struct Revisions {
    v1: Option<IDXGISwapChain1>,
    v2: Option<IDXGISwapChain2>,
    v3: Option<IDXGISwapChain3>,
    v4: Option<IDXGISwapChain4>,
}

// DXGI swap chains are free-threaded for the calls forwarded here, and the
// immediate context is only used for Flush, which the runtime serializes.
unsafe impl Send for DxgiSwapChain {}
unsafe impl Sync for DxgiSwapChain {}

impl DxgiSwapChain {
    pub fn new(swap_chain: IDXGISwapChain) -> Self {
        let revisions = Revisions {
            v1: swap_chain.cast().ok(),
            v2: swap_chain.cast().ok(),
            v3: swap_chain.cast().ok(),
            v4: swap_chain.cast().ok(),
        };

        let version = if revisions.v4.is_some() {
            SwapChainVersion::V4
        } else if revisions.v3.is_some() {
            SwapChainVersion::V3
        } else if revisions.v2.is_some() {
            SwapChainVersion::V2
        } else if revisions.v1.is_some() {
            SwapChainVersion::V1
        } else {
            SwapChainVersion::V0
        };

        let immediate_context = unsafe { swap_chain.GetDevice::<ID3D11Device>() }
            .ok()
            .and_then(|device| {
                let mut context = None;
                unsafe { device.GetImmediateContext(&mut context) };
                context
            });

        tracing::debug!(
            ?version,
            d3d11 = immediate_context.is_some(),
            "Opened DXGI swap chain"
        );

        Self {
            swap_chain,
            version,
            revisions,
            immediate_context,
        }
    }

    #[must_use]
    pub fn handle(&self) -> &IDXGISwapChain {
        &self.swap_chain
    }
}

/// Every COM vtable starts with the `IUnknown` entries.
fn unknown_vtable(object: &impl Interface) -> &IUnknown_Vtbl {
    unsafe { &**(object.as_raw() as *const *const IUnknown_Vtbl) }
}

/// `AddRef` on `object`, returning the object's own new count.
fn com_add_ref(object: &impl Interface) -> u32 {
    unsafe { (unknown_vtable(object).AddRef)(object.as_raw()) }
}

/// `Release` on `object`, returning the object's own new count.
fn com_release(object: &impl Interface) -> u32 {
    unsafe { (unknown_vtable(object).Release)(object.as_raw()) }
}

fn status(result: windows::core::Result<()>) -> Status {
    match result {
        Ok(()) => Status::OK,
        Err(e) => Status(e.code().0),
    }
}

fn hresult(code: HRESULT) -> Status {
    Status(code.0)
}

fn to_rect(rect: &crate::present::Rect) -> RECT {
    RECT {
        left: rect.left,
        top: rect.top,
        right: rect.right,
        bottom: rect.bottom,
    }
}

impl PresentationTarget for DxgiSwapChain {
    fn add_ref(&self) -> u32 {
        com_add_ref(&self.swap_chain)
    }

    fn release(&self) -> u32 {
        com_release(&self.swap_chain)
    }

    fn version(&self) -> SwapChainVersion {
        self.version
    }

    fn present(&self, sync_interval: u32, flags: PresentFlags) -> Status {
        hresult(unsafe { self.swap_chain.Present(sync_interval, flags.bits()) })
    }

    fn present1(
        &self,
        sync_interval: u32,
        flags: PresentFlags,
        parameters: &PresentParameters<'_>,
    ) -> Status {
        let Some(v1) = &self.revisions.v1 else {
            return Status::INVALID_CALL;
        };

        let mut dirty: Vec<RECT> = parameters.dirty_rects.iter().map(to_rect).collect();
        let mut scroll_rect = parameters.scroll_rect.as_ref().map(to_rect);
        let mut scroll_offset = parameters.scroll_offset.map(|(x, y)| POINT { x, y });

        let native = DXGI_PRESENT_PARAMETERS {
            DirtyRectsCount: u32::try_from(dirty.len()).unwrap_or(u32::MAX),
            pDirtyRects: if dirty.is_empty() {
                std::ptr::null_mut()
            } else {
                dirty.as_mut_ptr()
            },
            pScrollRect: scroll_rect
                .as_mut()
                .map_or(std::ptr::null_mut(), |r| r as *mut RECT),
            pScrollOffset: scroll_offset
                .as_mut()
                .map_or(std::ptr::null_mut(), |p| p as *mut POINT),
        };

        hresult(unsafe { v1.Present1(sync_interval, flags.bits(), &native) })
    }

    fn resize_buffers(&self, count: u32, width: u32, height: u32, format: u32, flags: u32) -> Status {
        #[allow(clippy::cast_possible_wrap)]
        let format = DXGI_FORMAT(format as i32);
        status(unsafe { self.swap_chain.ResizeBuffers(count, width, height, format, flags) })
    }

    fn resize_target(&self, mode: &ModeDesc) -> Status {
        #[allow(clippy::cast_possible_wrap)]
        let desc = DXGI_MODE_DESC {
            Width: mode.width,
            Height: mode.height,
            RefreshRate: DXGI_RATIONAL {
                Numerator: mode.refresh_numerator,
                Denominator: mode.refresh_denominator,
            },
            Format: DXGI_FORMAT(mode.format as i32),
            ..Default::default()
        };

        status(unsafe { self.swap_chain.ResizeTarget(&desc) })
    }

    fn buffer(&self, index: u32) -> Result<RawInterface, Status> {
        unsafe { self.swap_chain.GetBuffer::<IUnknown>(index) }
            .map(|buffer| RawInterface(buffer.into_raw() as usize))
            .map_err(|e| Status(e.code().0))
    }

    fn desc(&self) -> Result<BufferDesc, Status> {
        let mut desc = DXGI_SWAP_CHAIN_DESC::default();
        unsafe { self.swap_chain.GetDesc(&mut desc) }.map_err(|e| Status(e.code().0))?;

        #[allow(clippy::cast_sign_loss)]
        Ok(BufferDesc {
            width: desc.BufferDesc.Width,
            height: desc.BufferDesc.Height,
            format: desc.BufferDesc.Format.0 as u32,
            buffer_count: desc.BufferCount,
            flags: desc.Flags,
        })
    }

    fn frame_statistics(&self) -> Result<FrameStatistics, Status> {
        let mut stats = DXGI_FRAME_STATISTICS::default();
        unsafe { self.swap_chain.GetFrameStatistics(&mut stats) }
            .map_err(|e| Status(e.code().0))?;

        Ok(FrameStatistics {
            present_count: stats.PresentCount,
            present_refresh_count: stats.PresentRefreshCount,
            sync_refresh_count: stats.SyncRefreshCount,
            sync_time: Nanoseconds::from_qpc_time(stats.SyncQPCTime),
        })
    }

    fn last_present_count(&self) -> Result<u32, Status> {
        let mut count = 0;
        unsafe { self.swap_chain.GetLastPresentCount(&mut count) }
            .map_err(|e| Status(e.code().0))?;
        Ok(count)
    }

    fn current_back_buffer_index(&self) -> u32 {
        self.revisions
            .v3
            .as_ref()
            .map_or(0, |v3| unsafe { v3.GetCurrentBackBufferIndex() })
    }

    fn set_maximum_frame_latency(&self, frames: u32) -> Status {
        match &self.revisions.v2 {
            Some(v2) => status(unsafe { v2.SetMaximumFrameLatency(frames) }),
            None => Status::INVALID_CALL,
        }
    }

    fn maximum_frame_latency(&self) -> Result<u32, Status> {
        let v2 = self.revisions.v2.as_ref().ok_or(Status::INVALID_CALL)?;
        let mut frames = 0;
        unsafe { v2.GetMaximumFrameLatency(&mut frames) }.map_err(|e| Status(e.code().0))?;
        Ok(frames)
    }

    fn set_fullscreen_state(&self, fullscreen: bool) -> Status {
        status(unsafe { self.swap_chain.SetFullscreenState(fullscreen, None) })
    }

    fn fullscreen_state(&self) -> Result<bool, Status> {
        let mut fullscreen = BOOL::default();
        unsafe { self.swap_chain.GetFullscreenState(Some(&mut fullscreen), None) }
            .map_err(|e| Status(e.code().0))?;
        Ok(fullscreen.as_bool())
    }

    fn set_hdr_metadata(&self, kind: u32, metadata: &[u8]) -> Status {
        let Some(v4) = &self.revisions.v4 else {
            return Status::INVALID_CALL;
        };

        let size = u32::try_from(metadata.len()).unwrap_or(u32::MAX);
        let data = (!metadata.is_empty()).then(|| metadata.as_ptr().cast::<c_void>());

        #[allow(clippy::cast_possible_wrap)]
        let kind = DXGI_HDR_METADATA_TYPE(kind as i32);
        status(unsafe { v4.SetHDRMetaData(kind, size, data) })
    }

    fn set_color_space(&self, color_space: u32) -> Status {
        match &self.revisions.v3 {
            #[allow(clippy::cast_possible_wrap)]
            Some(v3) => status(unsafe { v3.SetColorSpace1(DXGI_COLOR_SPACE_TYPE(color_space as i32)) }),
            None => Status::INVALID_CALL,
        }
    }

    fn check_color_space_support(&self, color_space: u32) -> Result<u32, Status> {
        let v3 = self.revisions.v3.as_ref().ok_or(Status::INVALID_CALL)?;

        #[allow(clippy::cast_possible_wrap)]
        unsafe { v3.CheckColorSpaceSupport(DXGI_COLOR_SPACE_TYPE(color_space as i32)) }
            .map_err(|e| Status(e.code().0))
    }

    fn set_source_size(&self, width: u32, height: u32) -> Status {
        match &self.revisions.v2 {
            Some(v2) => status(unsafe { v2.SetSourceSize(width, height) }),
            None => Status::INVALID_CALL,
        }
    }

    fn source_size(&self) -> Result<(u32, u32), Status> {
        let v2 = self.revisions.v2.as_ref().ok_or(Status::INVALID_CALL)?;
        let (mut width, mut height) = (0, 0);
        unsafe { v2.GetSourceSize(&mut width, &mut height) }.map_err(|e| Status(e.code().0))?;
        Ok((width, height))
    }

    fn device(&self) -> Result<RawInterface, Status> {
        unsafe { self.swap_chain.GetDevice::<IUnknown>() }
            .map(|device| RawInterface(device.into_raw() as usize))
            .map_err(|e| Status(e.code().0))
    }

    fn flush(&self) {
        if let Some(context) = &self.immediate_context {
            unsafe { context.Flush() };
        }
    }
}
