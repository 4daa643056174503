// Shader reflection - reads the interface of a SPIR-V module
//
// Only the interface the pipeline layer can express is accepted: float
// vertex inputs, uniform buffers and combined image samplers in set 0, and at
// most one push-constant block. Anything else is an error, never skipped.
//
// Vertex attributes are packed tightly in location order, not in the order
// the module declares its input variables, so the layout is the same whatever
// order the compiler emitted them in.

use ash::vk;
use rspirv::dr::{Instruction, Module, Operand};
use spirv::{Decoration, ExecutionModel, Op, StorageClass};
use std::collections::HashMap;

use crate::error::ReflectError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        }
    }

    pub fn vk_flags(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexFormat {
    Float,
    Vec2,
    Vec3,
    Vec4,
}

impl VertexFormat {
    pub fn size(self) -> u32 {
        match self {
            VertexFormat::Float => 4,
            VertexFormat::Vec2 => 8,
            VertexFormat::Vec3 => 12,
            VertexFormat::Vec4 => 16,
        }
    }

    pub fn vk_format(self) -> vk::Format {
        match self {
            VertexFormat::Float => vk::Format::R32_SFLOAT,
            VertexFormat::Vec2 => vk::Format::R32G32_SFLOAT,
            VertexFormat::Vec3 => vk::Format::R32G32B32_SFLOAT,
            VertexFormat::Vec4 => vk::Format::R32G32B32A32_SFLOAT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexInput {
    pub location: u32,
    pub format: VertexFormat,
    pub offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    UniformBuffer,
    CombinedImageSampler,
}

impl DescriptorKind {
    pub fn name(self) -> &'static str {
        match self {
            DescriptorKind::UniformBuffer => "uniform buffer",
            DescriptorKind::CombinedImageSampler => "combined image sampler",
        }
    }

    pub fn vk_type(self) -> vk::DescriptorType {
        match self {
            DescriptorKind::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
            DescriptorKind::CombinedImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorBinding {
    pub binding: u32,
    pub kind: DescriptorKind,
}

/// Everything the pipeline layer needs to know about one shader stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderReflection {
    pub stage: ShaderStage,
    /// Vertex stage only, sorted by location
    pub vertex_inputs: Vec<VertexInput>,
    pub vertex_stride: u32,
    /// Sorted by binding number
    pub bindings: Vec<DescriptorBinding>,
    pub push_constant_size: u32,
}

/// Reflect a SPIR-V binary given as bytes (as read from a `.spv` file)
pub fn reflect_bytes(bytes: &[u8]) -> Result<ShaderReflection, ReflectError> {
    if bytes.len() % 4 != 0 {
        return Err(ReflectError::Misaligned(bytes.len()));
    }
    let words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    reflect(&words)
}

pub fn reflect(words: &[u32]) -> Result<ShaderReflection, ReflectError> {
    let module = rspirv::dr::load_words(words).map_err(|e| ReflectError::Parse(format!("{e:?}")))?;
    Reflector::new(&module).run()
}

#[derive(Default)]
struct Decorations {
    location: Option<u32>,
    binding: Option<u32>,
    set: Option<u32>,
    array_stride: Option<u32>,
    builtin: bool,
    block: bool,
    buffer_block: bool,
}

#[derive(Default)]
struct MemberDecorations {
    offset: Option<u32>,
    matrix_stride: Option<u32>,
}

struct Reflector<'m> {
    module: &'m Module,
    types: HashMap<u32, &'m Instruction>,
    decorations: HashMap<u32, Decorations>,
    members: HashMap<(u32, u32), MemberDecorations>,
}

fn literal(operand: Option<&Operand>) -> Option<u32> {
    match operand {
        Some(Operand::LiteralBit32(value)) => Some(*value),
        _ => None,
    }
}

fn id_ref(operand: Option<&Operand>) -> Option<u32> {
    match operand {
        Some(Operand::IdRef(id)) => Some(*id),
        _ => None,
    }
}

fn storage_class(operand: Option<&Operand>) -> Option<StorageClass> {
    match operand {
        Some(Operand::StorageClass(class)) => Some(*class),
        _ => None,
    }
}

fn malformed(inst: &Instruction) -> ReflectError {
    ReflectError::Parse(format!("malformed {:?}", inst.class.opcode))
}

impl<'m> Reflector<'m> {
    fn new(module: &'m Module) -> Self {
        let mut types = HashMap::new();
        for inst in &module.types_global_values {
            if let Some(id) = inst.result_id {
                types.insert(id, inst);
            }
        }

        let mut decorations: HashMap<u32, Decorations> = HashMap::new();
        let mut members: HashMap<(u32, u32), MemberDecorations> = HashMap::new();
        for inst in &module.annotations {
            match inst.class.opcode {
                Op::Decorate => {
                    let (Some(target), Some(Operand::Decoration(decoration))) =
                        (id_ref(inst.operands.first()), inst.operands.get(1))
                    else {
                        continue;
                    };
                    let value = literal(inst.operands.get(2));
                    let entry = decorations.entry(target).or_default();
                    match decoration {
                        Decoration::Location => entry.location = value,
                        Decoration::Binding => entry.binding = value,
                        Decoration::DescriptorSet => entry.set = value,
                        Decoration::ArrayStride => entry.array_stride = value,
                        Decoration::BuiltIn => entry.builtin = true,
                        Decoration::Block => entry.block = true,
                        Decoration::BufferBlock => entry.buffer_block = true,
                        _ => {}
                    }
                }
                Op::MemberDecorate => {
                    let (Some(target), Some(member), Some(Operand::Decoration(decoration))) = (
                        id_ref(inst.operands.first()),
                        literal(inst.operands.get(1)),
                        inst.operands.get(2),
                    ) else {
                        continue;
                    };
                    let value = literal(inst.operands.get(3));
                    let entry = members.entry((target, member)).or_default();
                    match decoration {
                        Decoration::Offset => entry.offset = value,
                        Decoration::MatrixStride => entry.matrix_stride = value,
                        _ => {}
                    }
                }
                _ => {}
            }
        }

        Self {
            module,
            types,
            decorations,
            members,
        }
    }

    fn run(&self) -> Result<ShaderReflection, ReflectError> {
        let stage = self.stage()?;
        self.reject_specialization()?;

        let mut vertex_inputs = Vec::new();
        let mut vertex_stride = 0;
        let mut bindings: Vec<DescriptorBinding> = Vec::new();
        let mut push_constant_size = None;

        for inst in &self.module.types_global_values {
            if inst.class.opcode != Op::Variable {
                continue;
            }
            let (Some(id), Some(pointer), Some(class)) =
                (inst.result_id, inst.result_type, storage_class(inst.operands.first()))
            else {
                return Err(malformed(inst));
            };
            let pointee = self.pointee(pointer)?;

            match class {
                StorageClass::Input if stage == ShaderStage::Vertex => {
                    let decorations = self.decorations.get(&id);
                    if decorations.is_some_and(|d| d.builtin) {
                        continue;
                    }
                    let location = decorations
                        .and_then(|d| d.location)
                        .ok_or(ReflectError::MissingLocation(id))?;
                    let format = self.vertex_format(location, pointee)?;
                    vertex_inputs.push(VertexInput {
                        location,
                        format,
                        offset: 0,
                    });
                }
                StorageClass::Uniform | StorageClass::UniformConstant | StorageClass::StorageBuffer => {
                    let decorations = self.decorations.get(&id);
                    let binding = decorations
                        .and_then(|d| d.binding)
                        .ok_or(ReflectError::MissingBinding(id))?;
                    let set = decorations.and_then(|d| d.set).unwrap_or(0);
                    if set != 0 {
                        return Err(ReflectError::UnsupportedDescriptorSet { set, binding });
                    }
                    let kind = self.descriptor_kind(class, binding, pointee)?;
                    bindings.push(DescriptorBinding { binding, kind });
                }
                StorageClass::PushConstant => {
                    if push_constant_size.is_some() {
                        return Err(ReflectError::MultiplePushConstantBlocks);
                    }
                    push_constant_size = Some(self.size_of(pointee)?);
                }
                _ => {}
            }
        }

        // Attributes are packed in location order, whatever order the
        // variables were emitted in
        vertex_inputs.sort_by_key(|input| input.location);
        for input in vertex_inputs.iter_mut() {
            input.offset = vertex_stride;
            vertex_stride += input.format.size();
        }
        bindings.sort_by_key(|b| b.binding);
        Ok(ShaderReflection {
            stage,
            vertex_inputs,
            vertex_stride,
            bindings,
            push_constant_size: push_constant_size.unwrap_or(0),
        })
    }

    fn stage(&self) -> Result<ShaderStage, ReflectError> {
        let entry = self.module.entry_points.first().ok_or(ReflectError::MissingEntryPoint)?;
        match entry.operands.first() {
            Some(Operand::ExecutionModel(ExecutionModel::Vertex)) => Ok(ShaderStage::Vertex),
            Some(Operand::ExecutionModel(ExecutionModel::Fragment)) => Ok(ShaderStage::Fragment),
            Some(Operand::ExecutionModel(other)) => Err(ReflectError::UnsupportedStage(format!("{other:?}"))),
            _ => Err(malformed(entry)),
        }
    }

    fn reject_specialization(&self) -> Result<(), ReflectError> {
        let spec_op = self.module.types_global_values.iter().any(|inst| {
            matches!(
                inst.class.opcode,
                Op::SpecConstant | Op::SpecConstantTrue | Op::SpecConstantFalse | Op::SpecConstantComposite | Op::SpecConstantOp
            )
        });
        let spec_id = self.module.annotations.iter().any(|inst| {
            inst.class.opcode == Op::Decorate && matches!(inst.operands.get(1), Some(Operand::Decoration(Decoration::SpecId)))
        });
        if spec_op || spec_id {
            return Err(ReflectError::SpecializationConstant);
        }
        Ok(())
    }

    fn ty(&self, id: u32) -> Result<&'m Instruction, ReflectError> {
        self.types.get(&id).copied().ok_or(ReflectError::UnknownType(id))
    }

    fn pointee(&self, pointer: u32) -> Result<u32, ReflectError> {
        let inst = self.ty(pointer)?;
        if inst.class.opcode != Op::TypePointer {
            return Err(malformed(inst));
        }
        id_ref(inst.operands.get(1)).ok_or_else(|| malformed(inst))
    }

    fn vertex_format(&self, location: u32, ty: u32) -> Result<VertexFormat, ReflectError> {
        let unsupported = |detail: String| ReflectError::UnsupportedInputType { location, detail };
        let inst = self.ty(ty)?;
        match inst.class.opcode {
            Op::TypeFloat if literal(inst.operands.first()) == Some(32) => Ok(VertexFormat::Float),
            Op::TypeVector => {
                let component = id_ref(inst.operands.first()).ok_or_else(|| malformed(inst))?;
                let count = literal(inst.operands.get(1)).ok_or_else(|| malformed(inst))?;
                let component = self.ty(component)?;
                if component.class.opcode != Op::TypeFloat || literal(component.operands.first()) != Some(32) {
                    return Err(unsupported(format!("vector of {:?}", component.class.opcode)));
                }
                match count {
                    2 => Ok(VertexFormat::Vec2),
                    3 => Ok(VertexFormat::Vec3),
                    4 => Ok(VertexFormat::Vec4),
                    n => Err(unsupported(format!("{n}-component vector"))),
                }
            }
            other => Err(unsupported(format!("{other:?}"))),
        }
    }

    fn descriptor_kind(&self, class: StorageClass, binding: u32, ty: u32) -> Result<DescriptorKind, ReflectError> {
        let unsupported = |kind| ReflectError::UnsupportedDescriptor { binding, kind };
        let inst = self.ty(ty)?;
        match (class, inst.class.opcode) {
            (StorageClass::StorageBuffer, _) => Err(unsupported("storage buffer")),
            (_, Op::TypeArray | Op::TypeRuntimeArray) => Err(unsupported("descriptor array")),
            (StorageClass::Uniform, Op::TypeStruct) => {
                let decorations = self.decorations.get(&ty);
                if decorations.is_some_and(|d| d.buffer_block) {
                    Err(unsupported("storage buffer"))
                } else if decorations.is_some_and(|d| d.block) {
                    Ok(DescriptorKind::UniformBuffer)
                } else {
                    Err(unsupported("undecorated uniform struct"))
                }
            }
            (StorageClass::UniformConstant, Op::TypeSampledImage) => Ok(DescriptorKind::CombinedImageSampler),
            (StorageClass::UniformConstant, Op::TypeSampler) => Err(unsupported("separate sampler")),
            (StorageClass::UniformConstant, Op::TypeImage) => {
                match (inst.operands.get(1), literal(inst.operands.get(5))) {
                    (Some(Operand::Dim(spirv::Dim::DimSubpassData)), _) => Err(unsupported("subpass input")),
                    (_, Some(2)) => Err(unsupported("storage image")),
                    _ => Err(unsupported("separate sampled image")),
                }
            }
            _ => Err(unsupported("unknown resource")),
        }
    }

    /// Byte size of a type as laid out in a block
    fn size_of(&self, ty: u32) -> Result<u32, ReflectError> {
        let inst = self.ty(ty)?;
        let size = match inst.class.opcode {
            Op::TypeFloat | Op::TypeInt => literal(inst.operands.first()).ok_or_else(|| malformed(inst))? / 8,
            Op::TypeBool => 4,
            Op::TypeVector => {
                let component = id_ref(inst.operands.first()).ok_or_else(|| malformed(inst))?;
                let count = literal(inst.operands.get(1)).ok_or_else(|| malformed(inst))?;
                self.size_of(component)? * count
            }
            Op::TypeMatrix => {
                let column = id_ref(inst.operands.first()).ok_or_else(|| malformed(inst))?;
                let count = literal(inst.operands.get(1)).ok_or_else(|| malformed(inst))?;
                self.size_of(column)? * count
            }
            Op::TypeArray => {
                let element = id_ref(inst.operands.first()).ok_or_else(|| malformed(inst))?;
                let length = id_ref(inst.operands.get(1)).ok_or_else(|| malformed(inst))?;
                let length = literal(self.ty(length)?.operands.first()).ok_or_else(|| malformed(inst))?;
                let stride = match self.decorations.get(&ty).and_then(|d| d.array_stride) {
                    Some(stride) => stride,
                    None => self.size_of(element)?,
                };
                stride * length
            }
            Op::TypeStruct => {
                let mut extent = 0;
                for (index, member) in inst.operands.iter().enumerate() {
                    let Operand::IdRef(member_ty) = member else {
                        return Err(malformed(inst));
                    };
                    let decorations = self.members.get(&(ty, index as u32));
                    let offset = decorations.and_then(|d| d.offset).unwrap_or(extent);
                    let size = match decorations.and_then(|d| d.matrix_stride) {
                        Some(stride) => {
                            let matrix = self.ty(*member_ty)?;
                            stride * literal(matrix.operands.get(1)).ok_or_else(|| malformed(matrix))?
                        }
                        None => self.size_of(*member_ty)?,
                    };
                    extent = extent.max(offset + size);
                }
                extent
            }
            other => {
                return Err(ReflectError::Parse(format!("{other:?} has no block layout")));
            }
        };
        Ok(size)
    }
}

#[cfg(test)]
pub(crate) mod test_spirv {
    //! A tiny SPIR-V assembler for reflection tests

    use spirv::Op;

    pub struct Assembler {
        words: Vec<u32>,
    }

    pub fn string(s: &str) -> Vec<u32> {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        while bytes.len() % 4 != 0 {
            bytes.push(0);
        }
        bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    impl Assembler {
        pub fn new() -> Self {
            Self {
                words: vec![0x0723_0203, 0x0001_0000, 0, 100, 0],
            }
        }

        pub fn op(&mut self, op: Op, operands: &[u32]) -> &mut Self {
            self.words.push(((operands.len() as u32 + 1) << 16) | op as u32);
            self.words.extend_from_slice(operands);
            self
        }

        /// Capability, memory model and the entry point `main` (id 1)
        pub fn header(&mut self, model: spirv::ExecutionModel, interface: &[u32]) -> &mut Self {
            self.op(Op::Capability, &[spirv::Capability::Shader as u32]);
            self.op(Op::MemoryModel, &[0, 1]);
            let mut operands = vec![model as u32, 1];
            operands.extend(string("main"));
            operands.extend_from_slice(interface);
            self.op(Op::EntryPoint, &operands)
        }

        /// `void main() {}` using ids 1 (function), 2 (void), 3 (fn type), 4 (label)
        pub fn finish(&mut self) -> Vec<u32> {
            self.op(Op::Function, &[2, 1, 0, 3]);
            self.op(Op::Label, &[4]);
            self.op(Op::Return, &[]);
            self.op(Op::FunctionEnd, &[]);
            self.words.clone()
        }

        /// Void (2) and function type (3). Declare before other types.
        pub fn void_fn(&mut self) -> &mut Self {
            self.op(Op::TypeVoid, &[2]);
            self.op(Op::TypeFunction, &[3, 2])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_spirv::Assembler;
    use super::*;
    use spirv::{Capability, Decoration as D, Dim, ExecutionModel as Model, StorageClass as SC};

    const INPUT: u32 = SC::Input as u32;
    const UNIFORM: u32 = SC::Uniform as u32;
    const UNIFORM_CONSTANT: u32 = SC::UniformConstant as u32;
    const PUSH: u32 = SC::PushConstant as u32;

    fn decorate(asm: &mut Assembler, id: u32, decoration: D, value: Option<u32>) {
        let mut operands = vec![id, decoration as u32];
        operands.extend(value);
        asm.op(Op::Decorate, &operands);
    }

    fn member_offset(asm: &mut Assembler, id: u32, member: u32, offset: u32) {
        asm.op(Op::MemberDecorate, &[id, member, D::Offset as u32, offset]);
    }

    /// float (10), vec2 (11), vec3 (12), vec4 (13), mat4 (14)
    fn float_types(asm: &mut Assembler) {
        asm.op(Op::TypeFloat, &[10, 32]);
        asm.op(Op::TypeVector, &[11, 10, 2]);
        asm.op(Op::TypeVector, &[12, 10, 3]);
        asm.op(Op::TypeVector, &[13, 10, 4]);
        asm.op(Op::TypeMatrix, &[14, 13, 4]);
    }

    /// `layout(push_constant) uniform { mat4; mat4; }` as struct 30, variable 32
    fn push_block(asm: &mut Assembler, struct_id: u32, members: &[u32]) {
        let mut operands = vec![struct_id];
        operands.extend_from_slice(members);
        asm.op(Op::TypeStruct, &operands);
        asm.op(Op::TypePointer, &[struct_id + 1, PUSH, struct_id]);
        asm.op(Op::Variable, &[struct_id + 1, struct_id + 2, PUSH]);
    }

    fn mesh_vertex_shader() -> Vec<u32> {
        let mut asm = Assembler::new();
        asm.header(Model::Vertex, &[20, 21, 22, 23]);
        decorate(&mut asm, 20, D::Location, Some(0));
        decorate(&mut asm, 21, D::Location, Some(1));
        decorate(&mut asm, 22, D::Location, Some(2));
        decorate(&mut asm, 23, D::BuiltIn, Some(spirv::BuiltIn::VertexIndex as u32));
        decorate(&mut asm, 30, D::Block, None);
        member_offset(&mut asm, 30, 0, 0);
        member_offset(&mut asm, 30, 1, 64);
        asm.void_fn();
        float_types(&mut asm);
        asm.op(Op::TypeInt, &[15, 32, 1]);
        asm.op(Op::TypePointer, &[16, INPUT, 12]);
        asm.op(Op::TypePointer, &[17, INPUT, 11]);
        asm.op(Op::TypePointer, &[18, INPUT, 15]);
        asm.op(Op::Variable, &[16, 20, INPUT]);
        asm.op(Op::Variable, &[16, 21, INPUT]);
        asm.op(Op::Variable, &[17, 22, INPUT]);
        asm.op(Op::Variable, &[18, 23, INPUT]);
        push_block(&mut asm, 30, &[14, 14]);
        asm.finish()
    }

    /// Fragment shader with a UBO at `ubo_binding` and a sampler at `sampler_binding`
    fn material_fragment_shader(ubo_binding: u32, sampler_binding: u32, sampler_set: u32) -> Vec<u32> {
        let mut asm = Assembler::new();
        asm.header(Model::Fragment, &[]);
        decorate(&mut asm, 40, D::Block, None);
        member_offset(&mut asm, 40, 0, 0);
        decorate(&mut asm, 42, D::Binding, Some(ubo_binding));
        decorate(&mut asm, 42, D::DescriptorSet, Some(0));
        decorate(&mut asm, 52, D::Binding, Some(sampler_binding));
        decorate(&mut asm, 52, D::DescriptorSet, Some(sampler_set));
        asm.void_fn();
        float_types(&mut asm);
        asm.op(Op::TypeStruct, &[40, 13]);
        asm.op(Op::TypePointer, &[41, UNIFORM, 40]);
        asm.op(Op::Variable, &[41, 42, UNIFORM]);
        asm.op(Op::TypeImage, &[50, 10, Dim::Dim2D as u32, 0, 0, 0, 1, 0]);
        asm.op(Op::TypeSampledImage, &[51, 50]);
        asm.op(Op::TypePointer, &[53, UNIFORM_CONSTANT, 51]);
        asm.op(Op::Variable, &[53, 52, UNIFORM_CONSTANT]);
        asm.finish()
    }

    #[test]
    fn vertex_inputs_are_packed_in_location_order() {
        let reflection = reflect(&mesh_vertex_shader()).unwrap();
        assert_eq!(reflection.stage, ShaderStage::Vertex);
        let offsets: Vec<_> = reflection
            .vertex_inputs
            .iter()
            .map(|input| (input.location, input.format, input.offset))
            .collect();
        assert_eq!(
            offsets,
            vec![
                (0, VertexFormat::Vec3, 0),
                (1, VertexFormat::Vec3, 12),
                (2, VertexFormat::Vec2, 24),
            ]
        );
        assert_eq!(reflection.vertex_stride, 32);
        assert!(reflection.bindings.is_empty());
    }

    #[test]
    fn emission_order_does_not_change_offsets() {
        // location 1 (vec2) is emitted before location 0 (vec4)
        let mut asm = Assembler::new();
        asm.header(Model::Vertex, &[20, 21]);
        decorate(&mut asm, 20, D::Location, Some(1));
        decorate(&mut asm, 21, D::Location, Some(0));
        asm.void_fn();
        float_types(&mut asm);
        asm.op(Op::TypePointer, &[16, INPUT, 11]);
        asm.op(Op::TypePointer, &[17, INPUT, 13]);
        asm.op(Op::Variable, &[16, 20, INPUT]);
        asm.op(Op::Variable, &[17, 21, INPUT]);

        let reflection = reflect(&asm.finish()).unwrap();
        let offsets: Vec<_> = reflection
            .vertex_inputs
            .iter()
            .map(|input| (input.location, input.offset))
            .collect();
        assert_eq!(offsets, vec![(0, 0), (1, 16)]);
        assert_eq!(reflection.vertex_stride, 24);
    }

    #[test]
    fn push_constant_size_is_block_extent() {
        let reflection = reflect(&mesh_vertex_shader()).unwrap();
        assert_eq!(reflection.push_constant_size, 128);
    }

    #[test]
    fn fragment_descriptors_are_sorted_by_binding() {
        let reflection = reflect(&material_fragment_shader(1, 0, 0)).unwrap();
        assert_eq!(reflection.stage, ShaderStage::Fragment);
        assert!(reflection.vertex_inputs.is_empty());
        assert_eq!(
            reflection.bindings,
            vec![
                DescriptorBinding {
                    binding: 0,
                    kind: DescriptorKind::CombinedImageSampler
                },
                DescriptorBinding {
                    binding: 1,
                    kind: DescriptorKind::UniformBuffer
                },
            ]
        );
        assert_eq!(reflection.push_constant_size, 0);
    }

    #[test]
    fn descriptor_set_other_than_zero_is_rejected() {
        let err = reflect(&material_fragment_shader(0, 1, 2)).unwrap_err();
        assert_eq!(err, ReflectError::UnsupportedDescriptorSet { set: 2, binding: 1 });
    }

    #[test]
    fn storage_buffer_is_rejected() {
        let mut asm = Assembler::new();
        asm.header(Model::Fragment, &[]);
        decorate(&mut asm, 40, D::BufferBlock, None);
        decorate(&mut asm, 42, D::Binding, Some(3));
        asm.void_fn();
        float_types(&mut asm);
        asm.op(Op::TypeStruct, &[40, 13]);
        asm.op(Op::TypePointer, &[41, UNIFORM, 40]);
        asm.op(Op::Variable, &[41, 42, UNIFORM]);
        let err = reflect(&asm.finish()).unwrap_err();
        assert_eq!(
            err,
            ReflectError::UnsupportedDescriptor {
                binding: 3,
                kind: "storage buffer"
            }
        );
    }

    #[test]
    fn separate_sampler_is_rejected() {
        let mut asm = Assembler::new();
        asm.header(Model::Fragment, &[]);
        decorate(&mut asm, 42, D::Binding, Some(0));
        asm.void_fn();
        asm.op(Op::TypeSampler, &[40]);
        asm.op(Op::TypePointer, &[41, UNIFORM_CONSTANT, 40]);
        asm.op(Op::Variable, &[41, 42, UNIFORM_CONSTANT]);
        let err = reflect(&asm.finish()).unwrap_err();
        assert_eq!(
            err,
            ReflectError::UnsupportedDescriptor {
                binding: 0,
                kind: "separate sampler"
            }
        );
    }

    #[test]
    fn sampler_array_is_rejected() {
        let mut asm = Assembler::new();
        asm.header(Model::Fragment, &[]);
        decorate(&mut asm, 56, D::Binding, Some(0));
        asm.void_fn();
        float_types(&mut asm);
        asm.op(Op::TypeInt, &[15, 32, 0]);
        asm.op(Op::Constant, &[15, 16, 4]);
        asm.op(Op::TypeImage, &[50, 10, Dim::Dim2D as u32, 0, 0, 0, 1, 0]);
        asm.op(Op::TypeSampledImage, &[51, 50]);
        asm.op(Op::TypeArray, &[54, 51, 16]);
        asm.op(Op::TypePointer, &[55, UNIFORM_CONSTANT, 54]);
        asm.op(Op::Variable, &[55, 56, UNIFORM_CONSTANT]);
        let err = reflect(&asm.finish()).unwrap_err();
        assert_eq!(
            err,
            ReflectError::UnsupportedDescriptor {
                binding: 0,
                kind: "descriptor array"
            }
        );
    }

    #[test]
    fn specialization_constants_are_rejected() {
        let mut asm = Assembler::new();
        asm.header(Model::Fragment, &[]);
        decorate(&mut asm, 16, D::SpecId, Some(0));
        asm.void_fn();
        asm.op(Op::TypeInt, &[15, 32, 0]);
        asm.op(Op::SpecConstant, &[15, 16, 7]);
        let err = reflect(&asm.finish()).unwrap_err();
        assert_eq!(err, ReflectError::SpecializationConstant);
    }

    #[test]
    fn second_push_constant_block_is_rejected() {
        let mut asm = Assembler::new();
        asm.header(Model::Vertex, &[]);
        asm.void_fn();
        float_types(&mut asm);
        push_block(&mut asm, 30, &[14]);
        push_block(&mut asm, 33, &[13]);
        let err = reflect(&asm.finish()).unwrap_err();
        assert_eq!(err, ReflectError::MultiplePushConstantBlocks);
    }

    #[test]
    fn integer_vertex_input_is_rejected() {
        let mut asm = Assembler::new();
        asm.header(Model::Vertex, &[20]);
        decorate(&mut asm, 20, D::Location, Some(4));
        asm.void_fn();
        asm.op(Op::TypeInt, &[15, 32, 1]);
        asm.op(Op::TypePointer, &[16, INPUT, 15]);
        asm.op(Op::Variable, &[16, 20, INPUT]);
        let err = reflect(&asm.finish()).unwrap_err();
        assert!(matches!(err, ReflectError::UnsupportedInputType { location: 4, .. }));
    }

    #[test]
    fn compute_stage_is_unsupported() {
        let mut asm = Assembler::new();
        asm.header(Model::GLCompute, &[]);
        asm.void_fn();
        let err = reflect(&asm.finish()).unwrap_err();
        assert_eq!(err, ReflectError::UnsupportedStage("GLCompute".into()));
    }

    #[test]
    fn module_without_entry_point_is_rejected() {
        let mut asm = Assembler::new();
        asm.op(Op::Capability, &[Capability::Shader as u32]);
        asm.op(Op::MemoryModel, &[0, 1]);
        asm.void_fn();
        let err = reflect(&asm.finish()).unwrap_err();
        assert_eq!(err, ReflectError::MissingEntryPoint);
    }

    #[test]
    fn misaligned_bytes_are_rejected() {
        assert_eq!(reflect_bytes(&[1, 2, 3]).unwrap_err(), ReflectError::Misaligned(3));
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(reflect(&[1, 2, 3, 4, 5]), Err(ReflectError::Parse(_))));
    }
}
