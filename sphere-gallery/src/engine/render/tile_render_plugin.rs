use crate::engine::instances::instance_binder::{SphereTiles, TileInstance};
use bevy::{
    core_pipeline::core_3d::Transparent3d,
    ecs::system::{SystemParamItem, lifetimeless::*},
    pbr::{MeshPipeline, MeshPipelineKey, RenderMeshInstances, SetMeshBindGroup, SetMeshViewBindGroup},
    prelude::*,
    render::{
        Render, RenderApp, RenderSet,
        extract_component::ExtractComponentPlugin,
        extract_resource::{ExtractResource, ExtractResourcePlugin},
        mesh::{MeshVertexBufferLayoutRef, RenderMesh, RenderMeshBufferInfo, allocator::MeshAllocator},
        render_asset::RenderAssets,
        render_phase::{
            AddRenderCommand, DrawFunctions, PhaseItem, PhaseItemExtraIndex, RenderCommand,
            RenderCommandResult, SetItemPipeline, TrackedRenderPass, ViewSortedRenderPhases,
        },
        render_resource::*,
        renderer::RenderDevice,
        sync_world::MainEntity,
        texture::{FallbackImage, GpuImage},
        view::ExtractedView,
    },
};
use constants::texture::MAX_SHEETS;

const SPHERE_TILES_SHADER_PATH: &str = "shaders/sphere_tiles.wgsl";

/// Sheet and overlay textures the tile shader samples this frame.
#[derive(Resource, Clone, Default, ExtractResource)]
pub struct TileTextureSet {
    pub sheets: Vec<Handle<Image>>,
    pub overlay: Option<Handle<Image>>,
}

pub struct TileRenderPlugin;

impl Plugin for TileRenderPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<TileTextureSet>()
            .add_plugins(ExtractComponentPlugin::<SphereTiles>::default())
            .add_plugins(ExtractResourcePlugin::<TileTextureSet>::default());

        let Some(render_app) = app.get_sub_app_mut(RenderApp) else {
            return;
        };

        render_app
            .add_render_command::<Transparent3d, DrawSphereTiles>()
            .init_resource::<SpecializedMeshPipelines<TilePipeline>>()
            .init_resource::<PreparedTileBindGroup>()
            .add_systems(
                Render,
                (
                    prepare_tile_bind_group.in_set(RenderSet::PrepareBindGroups),
                    queue_sphere_tiles.in_set(RenderSet::QueueMeshes),
                    prepare_tile_buffers.in_set(RenderSet::PrepareResources),
                ),
            );
    }

    fn finish(&self, app: &mut App) {
        let Some(render_app) = app.get_sub_app_mut(RenderApp) else {
            return;
        };
        render_app.init_resource::<TilePipeline>();
    }
}

#[derive(Component)]
pub struct TileInstanceBuffer {
    pub buffer: Buffer,
    pub length: usize,
}

#[derive(Resource)]
struct TilePipeline {
    shader: Handle<Shader>,
    mesh_pipeline: MeshPipeline,
    texture_layout: BindGroupLayout,
    sampler: Sampler,
}

impl FromWorld for TilePipeline {
    fn from_world(world: &mut World) -> Self {
        let mesh_pipeline = world.resource::<MeshPipeline>();
        let render_device = world.resource::<RenderDevice>();

        Self {
            shader: world.load_asset(SPHERE_TILES_SHADER_PATH),
            mesh_pipeline: mesh_pipeline.clone(),
            texture_layout: create_tile_bind_group_layout(render_device),
            sampler: render_device.create_sampler(&SamplerDescriptor {
                label: Some("sphere_tile_sampler"),
                mag_filter: FilterMode::Linear,
                min_filter: FilterMode::Linear,
                address_mode_u: AddressMode::ClampToEdge,
                address_mode_v: AddressMode::ClampToEdge,
                ..default()
            }),
        }
    }
}

impl SpecializedMeshPipeline for TilePipeline {
    type Key = MeshPipelineKey;

    fn specialize(
        &self,
        key: Self::Key,
        layout: &MeshVertexBufferLayoutRef,
    ) -> Result<RenderPipelineDescriptor, SpecializedMeshPipelineError> {
        let mut descriptor = self.mesh_pipeline.specialize(key, layout)?;
        descriptor.vertex.shader = self.shader.clone();
        // One vec4 per TileInstance field, locations 3..=8.
        let attributes = (0..6)
            .map(|i| VertexAttribute {
                format: VertexFormat::Float32x4,
                offset: i * 16,
                shader_location: 3 + i as u32,
            })
            .collect();
        descriptor.vertex.buffers.push(VertexBufferLayout {
            array_stride: std::mem::size_of::<TileInstance>() as u64,
            step_mode: VertexStepMode::Instance,
            attributes,
        });

        if let Some(fragment) = descriptor.fragment.as_mut() {
            fragment.shader = self.shader.clone();
        }
        descriptor.layout.push(self.texture_layout.clone());

        Ok(descriptor)
    }
}

#[derive(Resource, Default)]
struct PreparedTileBindGroup {
    bind_group: Option<BindGroup>,
}

fn prepare_tile_buffers(
    mut commands: Commands,
    query: Query<(Entity, &SphereTiles)>,
    render_device: Res<RenderDevice>,
) {
    for (entity, tiles) in &query {
        if tiles.is_empty() {
            commands.entity(entity).remove::<TileInstanceBuffer>();
            continue;
        }
        let buffer = render_device.create_buffer_with_data(&BufferInitDescriptor {
            label: Some("sphere_tile_instance_buffer"),
            contents: bytemuck::cast_slice(tiles.as_slice()),
            usage: BufferUsages::VERTEX | BufferUsages::COPY_DST,
        });
        commands.entity(entity).insert(TileInstanceBuffer {
            buffer,
            length: tiles.len(),
        });
    }
}

/// Binds every sheet slot, falling back to a blank texture for slots the
/// atlas does not use or whose upload is still pending.
fn prepare_tile_bind_group(
    mut prepared: ResMut<PreparedTileBindGroup>,
    render_device: Res<RenderDevice>,
    gpu_images: Res<RenderAssets<GpuImage>>,
    fallback: Res<FallbackImage>,
    textures: Res<TileTextureSet>,
    pipeline: Res<TilePipeline>,
) {
    let sheet_views: Vec<&TextureView> = (0..MAX_SHEETS)
        .map(|slot| texture_view(textures.sheets.get(slot), &gpu_images, &fallback))
        .collect();
    let overlay_view = texture_view(textures.overlay.as_ref(), &gpu_images, &fallback);

    let mut entries: Vec<BindGroupEntry> = sheet_views
        .iter()
        .enumerate()
        .map(|(slot, view)| BindGroupEntry {
            binding: slot as u32,
            resource: BindingResource::TextureView(view),
        })
        .collect();
    entries.push(BindGroupEntry {
        binding: MAX_SHEETS as u32,
        resource: BindingResource::TextureView(overlay_view),
    });
    entries.push(BindGroupEntry {
        binding: MAX_SHEETS as u32 + 1,
        resource: BindingResource::Sampler(&pipeline.sampler),
    });

    prepared.bind_group = Some(render_device.create_bind_group(
        "sphere_tile_texture_bind_group",
        &pipeline.texture_layout,
        &entries,
    ));
}

fn texture_view<'a>(
    handle: Option<&Handle<Image>>,
    gpu_images: &'a RenderAssets<GpuImage>,
    fallback: &'a FallbackImage,
) -> &'a TextureView {
    handle
        .and_then(|handle| gpu_images.get(handle))
        .map_or(&fallback.d2.texture_view, |gpu| &gpu.texture_view)
}

fn queue_sphere_tiles(
    transparent_3d_draw_functions: Res<DrawFunctions<Transparent3d>>,
    tile_pipeline: Res<TilePipeline>,
    mut pipelines: ResMut<SpecializedMeshPipelines<TilePipeline>>,
    pipeline_cache: Res<PipelineCache>,
    meshes: Res<RenderAssets<RenderMesh>>,
    render_mesh_instances: Res<RenderMeshInstances>,
    sphere_meshes: Query<(Entity, &MainEntity, &SphereTiles)>,
    mut transparent_render_phases: ResMut<ViewSortedRenderPhases<Transparent3d>>,
    views: Query<(&ExtractedView, &Msaa)>,
) {
    let draw_sphere_tiles = transparent_3d_draw_functions.read().id::<DrawSphereTiles>();

    for (view, msaa) in &views {
        let Some(transparent_phase) = transparent_render_phases.get_mut(&view.retained_view_entity) else {
            continue;
        };

        let view_key = MeshPipelineKey::from_msaa_samples(msaa.samples()) | MeshPipelineKey::from_hdr(view.hdr);
        let rangefinder = view.rangefinder3d();

        for (entity, main_entity, tiles) in &sphere_meshes {
            if tiles.is_empty() {
                continue;
            }
            let Some(mesh_instance) = render_mesh_instances.render_mesh_queue_data(*main_entity) else {
                continue;
            };
            let Some(mesh) = meshes.get(mesh_instance.mesh_asset_id) else {
                continue;
            };

            let key = view_key | MeshPipelineKey::from_primitive_topology(mesh.primitive_topology());
            let pipeline = match pipelines.specialize(&pipeline_cache, &tile_pipeline, key, &mesh.layout) {
                Ok(pipeline) => pipeline,
                Err(err) => {
                    error!("sphere tile pipeline specialisation failed: {err}");
                    continue;
                }
            };

            transparent_phase.add(Transparent3d {
                entity: (entity, *main_entity),
                pipeline,
                draw_function: draw_sphere_tiles,
                distance: rangefinder.distance_translation(&mesh_instance.translation),
                batch_range: 0..1,
                extra_index: PhaseItemExtraIndex::None,
                indexed: true,
            });
        }
    }
}

type DrawSphereTiles = (
    SetItemPipeline,
    SetMeshViewBindGroup<0>,
    SetMeshBindGroup<1>,
    SetTileTextureGroup<2>,
    DrawTileInstances,
);

struct SetTileTextureGroup<const I: usize>;

impl<P: PhaseItem, const I: usize> RenderCommand<P> for SetTileTextureGroup<I> {
    type Param = SRes<PreparedTileBindGroup>;
    type ViewQuery = ();
    type ItemQuery = ();

    #[inline]
    fn render<'w>(
        _item: &P,
        _view: (),
        _entity: Option<()>,
        prepared: SystemParamItem<'w, '_, Self::Param>,
        pass: &mut TrackedRenderPass<'w>,
    ) -> RenderCommandResult {
        match &prepared.into_inner().bind_group {
            Some(bind_group) => {
                pass.set_bind_group(I, bind_group, &[]);
                RenderCommandResult::Success
            }
            None => RenderCommandResult::Failure("missing tile texture bind group"),
        }
    }
}

struct DrawTileInstances;

impl<P: PhaseItem> RenderCommand<P> for DrawTileInstances {
    type Param = (
        SRes<RenderAssets<RenderMesh>>,
        SRes<RenderMeshInstances>,
        SRes<MeshAllocator>,
    );
    type ViewQuery = ();
    type ItemQuery = Read<TileInstanceBuffer>;

    #[inline]
    fn render<'w>(
        item: &P,
        _view: (),
        instance_buffer: Option<&'w TileInstanceBuffer>,
        (meshes, render_mesh_instances, mesh_allocator): SystemParamItem<'w, '_, Self::Param>,
        pass: &mut TrackedRenderPass<'w>,
    ) -> RenderCommandResult {
        let mesh_allocator = mesh_allocator.into_inner();

        let Some(mesh_instance) = render_mesh_instances.render_mesh_queue_data(item.main_entity()) else {
            return RenderCommandResult::Skip;
        };
        let Some(gpu_mesh) = meshes.into_inner().get(mesh_instance.mesh_asset_id) else {
            return RenderCommandResult::Skip;
        };
        let Some(instance_buffer) = instance_buffer else {
            return RenderCommandResult::Skip;
        };
        let Some(vertex_buffer_slice) = mesh_allocator.mesh_vertex_slice(&mesh_instance.mesh_asset_id) else {
            return RenderCommandResult::Skip;
        };

        pass.set_vertex_buffer(0, vertex_buffer_slice.buffer.slice(..));
        pass.set_vertex_buffer(1, instance_buffer.buffer.slice(..));

        match &gpu_mesh.buffer_info {
            RenderMeshBufferInfo::Indexed { index_format, count } => {
                let Some(index_buffer_slice) = mesh_allocator.mesh_index_slice(&mesh_instance.mesh_asset_id) else {
                    return RenderCommandResult::Skip;
                };

                pass.set_index_buffer(index_buffer_slice.buffer.slice(..), 0, *index_format);
                pass.draw_indexed(
                    index_buffer_slice.range.start..(index_buffer_slice.range.start + count),
                    vertex_buffer_slice.range.start as i32,
                    0..instance_buffer.length as u32,
                );
            }
            RenderMeshBufferInfo::NonIndexed => {
                pass.draw(vertex_buffer_slice.range, 0..instance_buffer.length as u32);
            }
        }
        RenderCommandResult::Success
    }
}

fn texture_entry(binding: u32) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::FRAGMENT,
        ty: BindingType::Texture {
            sample_type: TextureSampleType::Float { filterable: true },
            view_dimension: TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

/// Sheet textures at 0..MAX_SHEETS, then the high-res overlay, then the sampler.
fn create_tile_bind_group_layout(render_device: &RenderDevice) -> BindGroupLayout {
    let mut entries: Vec<BindGroupLayoutEntry> = (0..=MAX_SHEETS as u32).map(texture_entry).collect();
    entries.push(BindGroupLayoutEntry {
        binding: MAX_SHEETS as u32 + 1,
        visibility: ShaderStages::FRAGMENT,
        ty: BindingType::Sampler(SamplerBindingType::Filtering),
        count: None,
    });
    render_device.create_bind_group_layout("sphere_tile_texture_layout", &entries)
}
