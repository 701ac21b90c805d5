use anyhow::{Context, Result};
use glam::Mat4;
use wgpu::util::DeviceExt;
use wgpu::{
    BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayout, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, BindingType, BlendState, Buffer, BufferBindingType, BufferUsages,
    ColorTargetState, ColorWrites, CompositeAlphaMode, DeviceDescriptor, FragmentState, Instance,
    LoadOp, MultisampleState, Operations, PipelineLayoutDescriptor, PresentMode, PrimitiveState,
    PrimitiveTopology, RenderPassColorAttachment, RenderPassDescriptor, RenderPipeline,
    RenderPipelineDescriptor, RequestAdapterOptions, ShaderModuleDescriptor, ShaderSource,
    SurfaceConfiguration, TextureUsages, VertexState,
};
use winit::{dpi::PhysicalSize, window::Window};

use super::{DrawBatch, Vertex};

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct Uniforms {
    view_proj: [[f32; 4]; 4],
}

/// One coordinate space: its own uniform buffer and bind group, so world
/// and HUD geometry can be drawn in the same pass with different
/// projections.
struct Space {
    uniform_buffer: Buffer,
    bind_group: BindGroup,
}

impl Space {
    fn new(device: &wgpu::Device, layout: &BindGroupLayout, label: &str) -> Self {
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: std::mem::size_of::<Uniforms>() as u64,
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &[BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });
        Self {
            uniform_buffer,
            bind_group,
        }
    }
}

/// Line-and-fill renderer over wgpu. Geometry arrives as [`DrawBatch`]es
/// and is uploaded fresh each frame.
pub struct Renderer<'window> {
    surface: wgpu::Surface<'window>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_config: SurfaceConfiguration,
    present_mode: PresentMode,

    line_pipeline: RenderPipeline,
    fill_pipeline: RenderPipeline,
    world_space: Space,
    screen_space: Space,
}

impl<'window> Renderer<'window> {
    pub fn new(window: &'window Window, vsync: bool) -> Result<Self> {
        let instance = Instance::default();
        let surface = instance.create_surface(window)?;

        let adapter = pollster::block_on(instance.request_adapter(&RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))?;

        let (device, queue) = pollster::block_on(adapter.request_device(&DeviceDescriptor {
            label: Some("shardfall-device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            experimental_features: Default::default(),
            memory_hints: Default::default(),
            trace: wgpu::Trace::Off,
        }))?;

        let size = window.inner_size();
        let capabilities = surface.get_capabilities(&adapter);
        let format = capabilities
            .formats
            .iter()
            .copied()
            .find(|format| format.is_srgb())
            .unwrap_or(capabilities.formats[0]);

        let present_mode = choose_present_mode(&capabilities.present_modes, vsync);
        let alpha_mode = choose_alpha_mode(&capabilities.alpha_modes);

        let surface_config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let shader = device.create_shader_module(ShaderModuleDescriptor {
            label: Some("shape-shader"),
            source: ShaderSource::Wgsl(include_str!("shape.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("shape-bind-group-layout"),
            entries: &[BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: BindingType::Buffer {
                    ty: BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: std::num::NonZeroU64::new(
                        std::mem::size_of::<Uniforms>() as u64
                    ),
                },
                count: None,
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("shape-pipeline-layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let make_pipeline = |label: &str, topology: PrimitiveTopology| {
            device.create_render_pipeline(&RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x4],
                    }],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(FragmentState {
                    module: &shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(ColorTargetState {
                        format,
                        blend: Some(BlendState::ALPHA_BLENDING),
                        write_mask: ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: PrimitiveState {
                    topology,
                    ..PrimitiveState::default()
                },
                depth_stencil: None,
                multisample: MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            })
        };

        let line_pipeline = make_pipeline("shape-line-pipeline", PrimitiveTopology::LineList);
        let fill_pipeline = make_pipeline("shape-fill-pipeline", PrimitiveTopology::TriangleList);

        let world_space = Space::new(&device, &bind_group_layout, "world-uniforms");
        let screen_space = Space::new(&device, &bind_group_layout, "screen-uniforms");

        Ok(Self {
            surface,
            device,
            queue,
            surface_config,
            present_mode,
            line_pipeline,
            fill_pipeline,
            world_space,
            screen_space,
        })
    }

    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        self.surface_config.width = new_size.width;
        self.surface_config.height = new_size.height;
        self.surface_config.present_mode = self.present_mode;
        self.surface.configure(&self.device, &self.surface_config);
    }

    pub fn surface_size(&self) -> (u32, u32) {
        (self.surface_config.width, self.surface_config.height)
    }

    /// Draw one frame: world geometry under the camera projection, then
    /// HUD geometry in pixel coordinates, on a black clear.
    pub fn render(
        &mut self,
        world: &DrawBatch,
        world_view_proj: Mat4,
        screen: &DrawBatch,
        screen_view_proj: Mat4,
    ) -> Result<()> {
        self.queue.write_buffer(
            &self.world_space.uniform_buffer,
            0,
            bytemuck::bytes_of(&Uniforms {
                view_proj: world_view_proj.to_cols_array_2d(),
            }),
        );
        self.queue.write_buffer(
            &self.screen_space.uniform_buffer,
            0,
            bytemuck::bytes_of(&Uniforms {
                view_proj: screen_view_proj.to_cols_array_2d(),
            }),
        );

        let upload = |vertices: &[Vertex], label: &str| -> Option<Buffer> {
            if vertices.is_empty() {
                return None;
            }
            Some(
                self.device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some(label),
                        contents: bytemuck::cast_slice(vertices),
                        usage: BufferUsages::VERTEX,
                    }),
            )
        };

        let world_fills = upload(&world.fill_vertices, "world-fill-vertices");
        let world_lines = upload(&world.line_vertices, "world-line-vertices");
        let screen_fills = upload(&screen.fill_vertices, "screen-fill-vertices");
        let screen_lines = upload(&screen.line_vertices, "screen-line-vertices");

        let surface_texture = self
            .surface
            .get_current_texture()
            .context("failed to acquire the next swapchain texture")?;
        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("shape-encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("shape-pass"),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: Operations {
                        load: LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            let mut draw =
                |pipeline: &RenderPipeline, space: &Space, buffer: &Option<Buffer>, count: usize| {
                    if let Some(buffer) = buffer {
                        pass.set_pipeline(pipeline);
                        pass.set_bind_group(0, &space.bind_group, &[]);
                        pass.set_vertex_buffer(0, buffer.slice(..));
                        pass.draw(0..count as u32, 0..1);
                    }
                };

            draw(
                &self.fill_pipeline,
                &self.world_space,
                &world_fills,
                world.fill_vertices.len(),
            );
            draw(
                &self.line_pipeline,
                &self.world_space,
                &world_lines,
                world.line_vertices.len(),
            );
            draw(
                &self.fill_pipeline,
                &self.screen_space,
                &screen_fills,
                screen.fill_vertices.len(),
            );
            draw(
                &self.line_pipeline,
                &self.screen_space,
                &screen_lines,
                screen.line_vertices.len(),
            );
        }

        self.queue.submit(Some(encoder.finish()));
        surface_texture.present();

        Ok(())
    }
}

fn choose_present_mode(modes: &[PresentMode], vsync: bool) -> PresentMode {
    if vsync {
        modes
            .iter()
            .copied()
            .find(|mode| matches!(mode, PresentMode::Fifo | PresentMode::FifoRelaxed))
            .unwrap_or(PresentMode::Fifo)
    } else {
        modes
            .iter()
            .copied()
            .find(|mode| matches!(mode, PresentMode::Immediate | PresentMode::Mailbox))
            .unwrap_or(PresentMode::Immediate)
    }
}

fn choose_alpha_mode(modes: &[CompositeAlphaMode]) -> CompositeAlphaMode {
    modes
        .iter()
        .copied()
        .find(|mode| matches!(mode, CompositeAlphaMode::Auto))
        .unwrap_or_else(|| modes.first().copied().unwrap_or(CompositeAlphaMode::Opaque))
}
