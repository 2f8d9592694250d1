use brimstone_core::constants::SDF_WORKGROUP;
use brimstone_world::sdf::step_count;
use glam::UVec3;

use crate::buffers::GpuTables;

/// Uniforms for one jump-flood step. Must match SdfUniforms in
/// jump_flood.wgsl.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct SdfUniforms {
    dims: [u32; 3],
    _pad0: u32,
    num_steps: u32,
    current_step: u32,
    _pad1: [u32; 2],
}

/// The SDF propagation pass (jump flood over the handle grid).
///
/// One compute dispatch per step; submissions order the rounds, which
/// stands in for the memory barrier the algorithm requires between a
/// step's writes and the next step's reads.
pub struct SdfPass {
    pipeline: wgpu::ComputePipeline,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    handles_bgl: wgpu::BindGroupLayout,
    handles_bind_group: wgpu::BindGroup,
}

impl SdfPass {
    pub fn new(device: &wgpu::Device, tables: &GpuTables) -> Self {
        let preamble = crate::constants_preamble();
        let brick_wgsl = include_str!("../../../../shaders/common/brick.wgsl");
        let kernel_wgsl = include_str!("../../../../shaders/sdf/jump_flood.wgsl");
        let source = format!("{preamble}\n{brick_wgsl}\n{kernel_wgsl}");

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("jump-flood-shader"),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let uniform_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sdf-uniform-bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let handles_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sdf-handles-bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: false },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("sdf-pipeline-layout"),
            bind_group_layouts: &[&uniform_bgl, &handles_bgl],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("sdf-pipeline"),
            layout: Some(&layout),
            module: &module,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("sdf-uniforms"),
            size: std::mem::size_of::<SdfUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("sdf-uniform-bg"),
            layout: &uniform_bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let handles_bind_group = Self::create_handles_bind_group(device, &handles_bgl, tables);

        Self {
            pipeline,
            uniform_buffer,
            uniform_bind_group,
            handles_bgl,
            handles_bind_group,
        }
    }

    fn create_handles_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        tables: &GpuTables,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("sdf-handles-bg"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: tables.handles.as_entire_binding(),
            }],
        })
    }

    /// Rebuild the bind group after the handle buffer was recreated.
    pub fn rebind(&mut self, device: &wgpu::Device, tables: &GpuTables) {
        self.handles_bind_group = Self::create_handles_bind_group(device, &self.handles_bgl, tables);
    }

    /// Run the jump flood to fixed point for the current topology: the
    /// init step plus the halving radius sequence, one submission each.
    pub fn generate(&self, device: &wgpu::Device, queue: &wgpu::Queue, dims: UVec3) {
        let max_dim = dims.max_element().max(1);
        let steps = step_count(max_dim);
        let groups = [
            dims.x.div_ceil(SDF_WORKGROUP[0]),
            dims.y.div_ceil(SDF_WORKGROUP[1]),
            dims.z.div_ceil(SDF_WORKGROUP[2]),
        ];
        log::debug!("sdf pass over {dims} in {steps} steps, {groups:?} groups");

        for step in 0..steps {
            let uniforms = SdfUniforms {
                dims: dims.to_array(),
                _pad0: 0,
                num_steps: steps,
                current_step: step,
                _pad1: [0; 2],
            };
            queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("sdf-step-encoder"),
            });
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("sdf-step-pass"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&self.pipeline);
                pass.set_bind_group(0, &self.uniform_bind_group, &[]);
                pass.set_bind_group(1, &self.handles_bind_group, &[]);
                pass.dispatch_workgroups(groups[0], groups[1], groups[2]);
            }
            queue.submit(Some(encoder.finish()));
            device.poll(wgpu::Maintain::Wait);
        }
    }
}
