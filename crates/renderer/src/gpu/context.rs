use anyhow::{Context as AnyhowContext, Result};

use crate::types::AdapterProfile;

/// Headless device and queue; the overlay is an offscreen texture.
pub(crate) struct GpuContext {
    pub _instance: wgpu::Instance,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_profile: AdapterProfile,
    pub max_texture_size: u32,
    pub uniform_alignment: u32,
}

fn create_instance() -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        flags: wgpu::InstanceFlags::default(),
        memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
        backend_options: wgpu::BackendOptions::default(),
    })
}

fn request_adapter(instance: &wgpu::Instance) -> Result<wgpu::Adapter> {
    pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: None,
        force_fallback_adapter: false,
    }))
    .context("failed to find a suitable GPU adapter")
}

/// Returns the adapter that `GpuContext::new` would pick, if any.
pub fn probe_adapter() -> Option<AdapterProfile> {
    let instance = create_instance();
    match request_adapter(&instance) {
        Ok(adapter) => Some(AdapterProfile::from_wgpu(
            &adapter.get_info(),
            &adapter.limits(),
        )),
        Err(err) => {
            tracing::debug!(error = %err, "GPU probe found no adapter");
            None
        }
    }
}

impl GpuContext {
    pub(crate) fn new() -> Result<Self> {
        let instance = create_instance();
        let adapter = request_adapter(&instance)?;

        let adapter_info = adapter.get_info();
        let limits = adapter.limits();
        let adapter_profile = AdapterProfile::from_wgpu(&adapter_info, &limits);
        tracing::debug!(
            name = %adapter_profile.name,
            backend = ?adapter_profile.backend,
            device_type = ?adapter_profile.device_type,
            is_software = adapter_profile.is_software(),
            max_texture = limits.max_texture_dimension_2d,
            "selected GPU adapter"
        );

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("liquidglass device"),
            required_features: wgpu::Features::empty(),
            required_limits: limits.clone(),
            memory_hints: wgpu::MemoryHints::MemoryUsage,
            trace: wgpu::Trace::default(),
        }))
        .context("failed to create GPU device")?;

        Ok(Self {
            _instance: instance,
            device,
            queue,
            adapter_profile,
            max_texture_size: limits.max_texture_dimension_2d,
            uniform_alignment: limits.min_uniform_buffer_offset_alignment,
        })
    }
}
