use brimstone_core::constants::TRACE_WORKGROUP;

use crate::buffers::GpuTables;

/// Per-frame uniforms for the traversal kernel. Must match
/// TraceUniforms in ray_march.wgsl.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TraceUniforms {
    pub view_projection: [[f32; 4]; 4],
    pub inverse_view_projection: [[f32; 4]; 4],
    pub camera_position: [f32; 3],
    pub _pad0: f32,
    pub resolution: [f32; 2],
    pub render_mode: u32,
    pub max_ray_steps: u32,
    pub grid_dims: [u32; 3],
    pub _pad1: u32,
}

/// One storage-texture output of the traversal kernel.
struct OutputTarget {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

fn create_target(
    device: &wgpu::Device,
    label: &str,
    format: wgpu::TextureFormat,
    width: u32,
    height: u32,
) -> OutputTarget {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    OutputTarget {
        _texture: texture,
        view,
    }
}

/// The ray traversal pass: one thread per pixel, four storage-texture
/// outputs (albedo, depth, normal, traversal-cost intensity).
pub struct TracePass {
    pipeline: wgpu::ComputePipeline,
    uniform_buffer: wgpu::Buffer,
    frame_bgl: wgpu::BindGroupLayout,
    frame_bind_group: wgpu::BindGroup,
    scene_bgl: wgpu::BindGroupLayout,
    scene_bind_group: wgpu::BindGroup,
    albedo: OutputTarget,
    depth: OutputTarget,
    normal: OutputTarget,
    intensity: OutputTarget,
}

impl TracePass {
    pub fn new(device: &wgpu::Device, tables: &GpuTables, width: u32, height: u32) -> Self {
        let preamble = crate::constants_preamble();
        let brick_wgsl = include_str!("../../../../shaders/common/brick.wgsl");
        let kernel_wgsl = include_str!("../../../../shaders/trace/ray_march.wgsl");
        let source = format!("{preamble}\n{brick_wgsl}\n{kernel_wgsl}");

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("ray-march-shader"),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let storage_texture = |format| wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format,
            view_dimension: wgpu::TextureViewDimension::D2,
        };

        let frame_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("trace-frame-bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: storage_texture(wgpu::TextureFormat::Rgba8Unorm),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: storage_texture(wgpu::TextureFormat::R32Float),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: storage_texture(wgpu::TextureFormat::Rgba8Unorm),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: storage_texture(wgpu::TextureFormat::R32Float),
                    count: None,
                },
            ],
        });

        let storage_buffer = |read_only| wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        };

        let scene_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("trace-scene-bgl"),
            entries: &[
                // binding 0: handle grid
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: storage_buffer(true),
                    count: None,
                },
                // binding 1: trace bricks
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: storage_buffer(true),
                    count: None,
                },
                // binding 2: payload arena
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: storage_buffer(true),
                    count: None,
                },
                // binding 3: palette arena
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: storage_buffer(true),
                    count: None,
                },
                // binding 4: material table
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: storage_buffer(true),
                    count: None,
                },
                // binding 5: seen mask (the one device-side write)
                wgpu::BindGroupLayoutEntry {
                    binding: 5,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: storage_buffer(false),
                    count: None,
                },
            ],
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("trace-pipeline-layout"),
            bind_group_layouts: &[&frame_bgl, &scene_bgl],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("trace-pipeline"),
            layout: Some(&layout),
            module: &module,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("trace-uniforms"),
            size: std::mem::size_of::<TraceUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let albedo = create_target(device, "trace-albedo", wgpu::TextureFormat::Rgba8Unorm, width, height);
        let depth = create_target(device, "trace-depth", wgpu::TextureFormat::R32Float, width, height);
        let normal = create_target(device, "trace-normal", wgpu::TextureFormat::Rgba8Unorm, width, height);
        let intensity = create_target(device, "trace-intensity", wgpu::TextureFormat::R32Float, width, height);

        let frame_bind_group = Self::create_frame_bind_group(
            device,
            &frame_bgl,
            &uniform_buffer,
            &albedo,
            &depth,
            &normal,
            &intensity,
        );
        let scene_bind_group = Self::create_scene_bind_group(device, &scene_bgl, tables);

        Self {
            pipeline,
            uniform_buffer,
            frame_bgl,
            frame_bind_group,
            scene_bgl,
            scene_bind_group,
            albedo,
            depth,
            normal,
            intensity,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn create_frame_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        uniforms: &wgpu::Buffer,
        albedo: &OutputTarget,
        depth: &OutputTarget,
        normal: &OutputTarget,
        intensity: &OutputTarget,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("trace-frame-bg"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniforms.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&albedo.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&depth.view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&normal.view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(&intensity.view),
                },
            ],
        })
    }

    fn create_scene_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        tables: &GpuTables,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("trace-scene-bg"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: tables.handles.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: tables.trace_bricks.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: tables.payload.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: tables.palettes.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: tables.materials.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: tables.seen.as_entire_binding(),
                },
            ],
        })
    }

    /// Rebuild the scene bind group after a table buffer was recreated.
    pub fn rebind_scene(&mut self, device: &wgpu::Device, tables: &GpuTables) {
        self.scene_bind_group = Self::create_scene_bind_group(device, &self.scene_bgl, tables);
    }

    /// Recreate the output targets on viewport resize.
    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        self.albedo = create_target(device, "trace-albedo", wgpu::TextureFormat::Rgba8Unorm, width, height);
        self.depth = create_target(device, "trace-depth", wgpu::TextureFormat::R32Float, width, height);
        self.normal = create_target(device, "trace-normal", wgpu::TextureFormat::Rgba8Unorm, width, height);
        self.intensity = create_target(device, "trace-intensity", wgpu::TextureFormat::R32Float, width, height);
        self.frame_bind_group = Self::create_frame_bind_group(
            device,
            &self.frame_bgl,
            &self.uniform_buffer,
            &self.albedo,
            &self.depth,
            &self.normal,
            &self.intensity,
        );
    }

    pub fn update_uniforms(&self, queue: &wgpu::Queue, uniforms: TraceUniforms) {
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));
    }

    /// Encode the traversal dispatch covering every pixel.
    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder, width: u32, height: u32) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("trace-pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.frame_bind_group, &[]);
        pass.set_bind_group(1, &self.scene_bind_group, &[]);
        pass.dispatch_workgroups(
            width.div_ceil(TRACE_WORKGROUP[0]),
            height.div_ceil(TRACE_WORKGROUP[1]),
            1,
        );
    }

    pub fn albedo_view(&self) -> &wgpu::TextureView {
        &self.albedo.view
    }

    pub fn depth_view(&self) -> &wgpu::TextureView {
        &self.depth.view
    }

    pub fn normal_view(&self) -> &wgpu::TextureView {
        &self.normal.view
    }

    pub fn intensity_view(&self) -> &wgpu::TextureView {
        &self.intensity.view
    }
}
