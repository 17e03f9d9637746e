//! Operator registry: qualified name -> converter dispatch table
//!
//! The registry is the single total map from source operator names to
//! converter instances. Dispatch is purely name-based; overload resolution
//! happened upstream in the tracer, so one name always means one converter.
//! In-place variants (`aten::relu_`) are aliases inserted at construction
//! and share the entry of their out-of-place form, which keeps the two
//! spellings impossible to drift apart.

use std::sync::OnceLock;

use rustc_hash::FxHashMap;

use crate::convert::aten::{
    Addmm, BatchNorm, CatStack, Chunk, Conv2d, Embedding, LayerNorm, Linear, Passthrough,
    Permute, Pool2d, Reshape, SimpleOp, Softmax,
};
use crate::convert::prim::{
    AggregateConstruct, AggregateUnpack, NoTrack, PrimConstant, PrimConstantChunk,
    PrimDictConstruct, PrimGetAttr, PrimGetItem, PrimIf, PrimLen, PrimNumToTensor,
    TrackConstant,
};
use crate::convert::quant::{
    Dequantize, FusedQuantized, OutputParams, Quantize, QuantizedCat,
};
use crate::convert::NodeConverter;
use crate::error::{ConvertError, ConvertResult};
use crate::source::OpName;
use crate::target::TargetOp;

/// The dispatch table for the whole conversion pass
pub struct Registry {
    entries: Vec<Box<dyn NodeConverter>>,
    by_name: FxHashMap<&'static str, usize>,
}

impl Registry {
    /// Build the full operator table
    pub fn new() -> Self {
        let mut r = Registry {
            entries: Vec::new(),
            by_name: FxHashMap::default(),
        };
        r.register_prim();
        r.register_aten();
        r.register_quantized();
        r.register_aliases();
        r
    }

    /// The process-wide registry instance
    pub fn global() -> &'static Registry {
        static GLOBAL: OnceLock<Registry> = OnceLock::new();
        GLOBAL.get_or_init(Registry::new)
    }

    /// Resolve an operator name to its converter
    pub fn lookup(&self, op: &OpName) -> ConvertResult<&dyn NodeConverter> {
        self.by_name
            .get(op.as_str())
            .map(|&index| self.entries[index].as_ref())
            .ok_or_else(|| ConvertError::UnsupportedOperator(op.as_str().to_string()))
    }

    /// Whether the name has an entry
    pub fn supports(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Entry index backing a name, if registered
    ///
    /// Two names with the same index share one converter instance; this is
    /// how alias identity is observable.
    pub fn entry_index(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Number of registered names, aliases included
    pub fn name_count(&self) -> usize {
        self.by_name.len()
    }

    // ========================================================================
    // Construction
    // ========================================================================

    fn add(&mut self, name: &'static str, converter: Box<dyn NodeConverter>) {
        let index = self.entries.len();
        self.entries.push(converter);
        self.by_name.insert(name, index);
    }

    fn simple(&mut self, name: &'static str, target: TargetOp) {
        self.add(name, Box::new(SimpleOp { target }));
    }

    fn fused(&mut self, name: &'static str, target: TargetOp, output_params: OutputParams) {
        self.add(
            name,
            Box::new(FusedQuantized {
                target,
                output_params,
            }),
        );
    }

    fn alias(&mut self, alias: &'static str, canonical: &str) {
        let index = self
            .by_name
            .get(canonical)
            .copied()
            .expect("alias target registered before aliases");
        self.by_name.insert(alias, index);
    }

    fn register_prim(&mut self) {
        self.add("prim::Constant", Box::new(PrimConstant));
        self.add("prim::ListConstruct", Box::new(AggregateConstruct { tuple: false }));
        self.add("prim::TupleConstruct", Box::new(AggregateConstruct { tuple: true }));
        self.add("prim::DictConstruct", Box::new(PrimDictConstruct));
        self.add("prim::ListUnpack", Box::new(AggregateUnpack));
        self.add("prim::TupleUnpack", Box::new(AggregateUnpack));
        self.add("prim::GetAttr", Box::new(PrimGetAttr));
        self.add("prim::ConstantChunk", Box::new(PrimConstantChunk));
        self.add("prim::NumToTensor", Box::new(PrimNumToTensor));
        self.add("prim::If", Box::new(PrimIf));
    }

    fn register_aten(&mut self) {
        // structural helpers living in the aten namespace
        self.add("aten::__getitem__", Box::new(PrimGetItem));
        self.add("aten::len", Box::new(PrimLen));
        self.add("aten::Int", Box::new(TrackConstant { to_int: true }));
        self.add("aten::ScalarImplicit", Box::new(TrackConstant { to_int: false }));

        // shape queries and tensor factories are trace-time artifacts
        for name in [
            "aten::arange",
            "aten::detach",
            "aten::empty",
            "aten::new_ones",
            "aten::new_zeros",
            "aten::ones",
            "aten::ones_like",
            "aten::size",
            "aten::zeros",
            "aten::zeros_like",
        ] {
            self.add(name, Box::new(NoTrack));
        }

        // identity at inference time
        self.add("aten::dropout", Box::new(Passthrough));
        self.add("aten::feature_dropout", Box::new(Passthrough));
        self.add("aten::contiguous", Box::new(Passthrough));
        self.add("aten::clone", Box::new(Passthrough));

        // structured lowerings
        self.add("aten::conv2d", Box::new(Conv2d { extended: false }));
        self.add("aten::_convolution", Box::new(Conv2d { extended: true }));
        self.add("aten::linear", Box::new(Linear));
        self.add("aten::addmm", Box::new(Addmm));
        self.add("aten::cat", Box::new(CatStack { pack: false }));
        self.add("aten::stack", Box::new(CatStack { pack: true }));
        self.add("aten::chunk", Box::new(Chunk));
        self.add("aten::unsafe_chunk", Box::new(Chunk));
        self.add("aten::view", Box::new(Reshape));
        self.add("aten::reshape", Box::new(Reshape));
        self.add("aten::permute", Box::new(Permute));
        self.add("aten::softmax", Box::new(Softmax { log: false }));
        self.add("aten::log_softmax", Box::new(Softmax { log: true }));
        self.add("aten::avg_pool2d", Box::new(Pool2d { target: TargetOp::AveragePool2d }));
        self.add("aten::max_pool2d", Box::new(Pool2d { target: TargetOp::MaxPool2d }));
        self.add("aten::batch_norm", Box::new(BatchNorm));
        self.add("aten::layer_norm", Box::new(LayerNorm));
        self.add("aten::embedding", Box::new(Embedding));

        // elementwise unary
        self.simple("aten::abs", TargetOp::Abs);
        self.simple("aten::atan2", TargetOp::Atan2);
        self.simple("aten::cos", TargetOp::Cos);
        self.simple("aten::exp", TargetOp::Exp);
        self.simple("aten::floor", TargetOp::Floor);
        self.simple("aten::log", TargetOp::Log);
        self.simple("aten::neg", TargetOp::Neg);
        self.simple("aten::reciprocal", TargetOp::Reciprocal);
        self.simple("aten::round", TargetOp::Round);
        self.simple("aten::rsqrt", TargetOp::Rsqrt);
        self.simple("aten::sign", TargetOp::Sign);
        self.simple("aten::sin", TargetOp::Sin);
        self.simple("aten::sqrt", TargetOp::Sqrt);

        // activations
        self.simple("aten::elu", TargetOp::Elu);
        self.simple("aten::gelu", TargetOp::Gelu);
        self.simple("aten::glu", TargetOp::Glu);
        self.simple("aten::hardsigmoid", TargetOp::HardSigmoid);
        self.simple("aten::hardswish", TargetOp::HardSwish);
        self.simple("aten::hardtanh", TargetOp::Clamp);
        self.simple("aten::leaky_relu", TargetOp::LeakyRelu);
        self.simple("aten::mish", TargetOp::Mish);
        self.simple("aten::prelu", TargetOp::Prelu);
        self.simple("aten::relu", TargetOp::Relu);
        self.simple("aten::relu6", TargetOp::Relu6);
        self.simple("aten::sigmoid", TargetOp::Logistic);
        self.simple("aten::silu", TargetOp::Silu);
        self.simple("aten::softplus", TargetOp::Softplus);
        self.simple("aten::tanh", TargetOp::Tanh);

        // elementwise binary, comparison, logical
        self.simple("aten::add", TargetOp::Add);
        self.simple("aten::sub", TargetOp::Sub);
        self.simple("aten::rsub", TargetOp::Sub);
        self.simple("aten::mul", TargetOp::Mul);
        self.simple("aten::div", TargetOp::Div);
        self.simple("aten::floor_divide", TargetOp::FloorDiv);
        self.simple("aten::remainder", TargetOp::FloorMod);
        self.simple("aten::pow", TargetOp::Pow);
        self.simple("aten::clamp", TargetOp::Clamp);
        self.simple("aten::clamp_max", TargetOp::Minimum);
        self.simple("aten::clamp_min", TargetOp::Maximum);
        self.simple("aten::maximum", TargetOp::Maximum);
        self.simple("aten::minimum", TargetOp::Minimum);
        self.simple("aten::eq", TargetOp::Equal);
        self.simple("aten::ne", TargetOp::NotEqual);
        self.simple("aten::ge", TargetOp::GreaterEqual);
        self.simple("aten::gt", TargetOp::Greater);
        self.simple("aten::le", TargetOp::LessEqual);
        self.simple("aten::lt", TargetOp::Less);
        self.simple("aten::__and__", TargetOp::LogicalAnd);
        self.simple("aten::bitwise_and", TargetOp::LogicalAnd);
        self.simple("aten::__or__", TargetOp::LogicalOr);
        self.simple("aten::bitwise_or", TargetOp::LogicalOr);
        self.simple("aten::bitwise_not", TargetOp::LogicalNot);
        self.simple("aten::where", TargetOp::SelectV2);
        self.simple("aten::masked_fill", TargetOp::SelectV2);
        self.simple("aten::fill_", TargetOp::Fill);

        // reductions
        self.simple("aten::amax", TargetOp::ReduceMax);
        self.simple("aten::amin", TargetOp::ReduceMin);
        self.simple("aten::argmax", TargetOp::ArgMax);
        self.simple("aten::argmin", TargetOp::ArgMin);
        self.simple("aten::cumsum", TargetOp::Cumsum);
        self.simple("aten::frobenius_norm", TargetOp::Norm);
        self.simple("aten::linalg_vector_norm", TargetOp::Norm);
        self.simple("aten::max", TargetOp::ReduceMax);
        self.simple("aten::mean", TargetOp::Mean);
        self.simple("aten::min", TargetOp::ReduceMin);
        self.simple("aten::norm", TargetOp::Norm);
        self.simple("aten::prod", TargetOp::Prod);
        self.simple("aten::std", TargetOp::Std);
        self.simple("aten::sum", TargetOp::Sum);
        self.simple("aten::topk", TargetOp::TopK);
        self.simple("aten::var", TargetOp::Var);

        // matrix products
        self.simple("aten::addbmm", TargetOp::BatchMatMul);
        self.simple("aten::baddbmm", TargetOp::BatchMatMul);
        self.simple("aten::bmm", TargetOp::BatchMatMul);
        self.simple("aten::matmul", TargetOp::BatchMatMul);
        self.simple("aten::mm", TargetOp::BatchMatMul);

        // shape and data movement
        self.simple("aten::broadcast_tensors", TargetOp::BroadcastTo);
        self.simple("aten::col2im", TargetOp::Col2im);
        self.simple("aten::constant_pad_nd", TargetOp::Pad);
        self.simple("aten::copy_", TargetOp::Cast);
        self.simple("aten::expand", TargetOp::BroadcastTo);
        self.simple("aten::expand_as", TargetOp::BroadcastTo);
        self.simple("aten::flatten", TargetOp::Reshape);
        self.simple("aten::flip", TargetOp::ReverseV2);
        self.simple("aten::gather", TargetOp::GatherNd);
        self.simple("aten::im2col", TargetOp::Im2col);
        self.simple("aten::index", TargetOp::GatherNd);
        self.simple("aten::index_put", TargetOp::ScatterNd);
        self.simple("aten::index_select", TargetOp::Gather);
        self.simple("aten::meshgrid", TargetOp::Meshgrid);
        self.simple("aten::pad", TargetOp::Pad);
        self.simple("aten::pixel_shuffle", TargetOp::DepthToSpace);
        self.simple("aten::pixel_unshuffle", TargetOp::SpaceToDepth);
        self.simple("aten::reflection_pad1d", TargetOp::MirrorPad);
        self.simple("aten::reflection_pad2d", TargetOp::MirrorPad);
        self.simple("aten::repeat", TargetOp::Tile);
        self.simple("aten::repeat_interleave", TargetOp::Tile);
        self.simple("aten::roll", TargetOp::Roll);
        self.simple("aten::scatter_", TargetOp::ScatterNd);
        self.simple("aten::select", TargetOp::Gather);
        self.simple("aten::slice", TargetOp::StridedSlice);
        self.simple("aten::split", TargetOp::SplitV);
        self.simple("aten::split_with_sizes", TargetOp::SplitV);
        self.simple("aten::squeeze", TargetOp::Squeeze);
        self.simple("aten::t", TargetOp::Transpose);
        self.simple("aten::to", TargetOp::Cast);
        self.simple("aten::transpose", TargetOp::Transpose);
        self.simple("aten::type_as", TargetOp::Cast);
        self.simple("aten::unbind", TargetOp::Unpack);
        self.simple("aten::unsqueeze", TargetOp::ExpandDims);
        self.simple("aten::upsample_bilinear2d", TargetOp::ResizeBilinear);
        self.simple("aten::upsample_nearest2d", TargetOp::ResizeNearestNeighbor);

        // neural-network kernels without structured lowering
        self.simple("aten::adaptive_avg_pool2d", TargetOp::AdaptiveAvgPool2d);
        self.simple("aten::adaptive_max_pool2d", TargetOp::AdaptiveMaxPool2d);
        self.simple("aten::group_norm", TargetOp::GroupNorm);
        self.simple("aten::gru", TargetOp::Gru);
        self.simple("aten::instance_norm", TargetOp::InstanceNorm);
        self.simple("aten::lstm", TargetOp::UnidirectionalLstm);

        // fake-quantization observers pass through as annotation nodes
        self.simple("aten::fake_quantize_per_channel_affine", TargetOp::FakeQuant);
        self.simple("aten::fake_quantize_per_tensor_affine", TargetOp::FakeQuant);
    }

    fn register_quantized(&mut self) {
        self.add("aten::quantize_per_tensor", Box::new(Quantize));
        self.add("aten::dequantize", Box::new(Dequantize));
        self.add("quantized::cat", Box::new(QuantizedCat));

        use OutputParams::{FromInputs, Propagate};
        self.fused("quantized::add", TargetOp::QuantizedAdd, FromInputs);
        self.fused("quantized::add_relu", TargetOp::QuantizedAddRelu, FromInputs);
        self.fused("quantized::add_scalar", TargetOp::QuantizedAddScalar, FromInputs);
        self.fused("quantized::batch_norm1d", TargetOp::QuantizedBatchNorm1d, FromInputs);
        self.fused("quantized::batch_norm2d", TargetOp::QuantizedBatchNorm2d, FromInputs);
        self.fused(
            "quantized::batch_norm2d_relu",
            TargetOp::QuantizedBatchNorm2dRelu,
            FromInputs,
        );
        self.fused("quantized::conv1d", TargetOp::QuantizedConv1d, FromInputs);
        self.fused("quantized::conv1d_relu", TargetOp::QuantizedConv1dRelu, FromInputs);
        self.fused("quantized::conv2d", TargetOp::QuantizedConv2d, FromInputs);
        self.fused("quantized::conv2d_relu", TargetOp::QuantizedConv2dRelu, FromInputs);
        self.fused(
            "quantized::conv_transpose1d",
            TargetOp::QuantizedConvTranspose1d,
            FromInputs,
        );
        self.fused(
            "quantized::conv_transpose2d",
            TargetOp::QuantizedConvTranspose2d,
            FromInputs,
        );
        self.fused("quantized::elu", TargetOp::QuantizedElu, FromInputs);
        self.fused("quantized::hardswish", TargetOp::QuantizedHardswish, FromInputs);
        self.fused("quantized::leaky_relu", TargetOp::QuantizedLeakyRelu, FromInputs);
        self.fused("quantized::linear", TargetOp::QuantizedLinear, FromInputs);
        self.fused("quantized::linear_relu", TargetOp::QuantizedLinearRelu, FromInputs);
        self.fused("quantized::mul", TargetOp::QuantizedMul, FromInputs);
        self.fused("quantized::mul_scalar", TargetOp::QuantizedMulScalar, FromInputs);
        // relu6 carries no explicit output parameters
        self.fused("quantized::relu6", TargetOp::QuantizedRelu6, Propagate);

        // dynamic variants quantize internally; their inputs are float
        self.simple("quantized::linear_dynamic", TargetOp::QuantizedLinearDynamic);
        self.simple(
            "quantized::linear_relu_dynamic",
            TargetOp::QuantizedLinearReluDynamic,
        );
        self.simple("aten::quantized_lstm", TargetOp::QuantizedLstm);
    }

    fn register_aliases(&mut self) {
        for (inplace, canonical) in [
            ("aten::add_", "aten::add"),
            ("aten::div_", "aten::div"),
            ("aten::dropout_", "aten::dropout"),
            ("aten::elu_", "aten::elu"),
            ("aten::feature_dropout_", "aten::feature_dropout"),
            ("aten::gelu_", "aten::gelu"),
            ("aten::glu_", "aten::glu"),
            ("aten::hardsigmoid_", "aten::hardsigmoid"),
            ("aten::hardswish_", "aten::hardswish"),
            ("aten::hardtanh_", "aten::hardtanh"),
            ("aten::index_put_", "aten::index_put"),
            ("aten::leaky_relu_", "aten::leaky_relu"),
            ("aten::masked_fill_", "aten::masked_fill"),
            ("aten::mul_", "aten::mul"),
            ("aten::reciprocal_", "aten::reciprocal"),
            ("aten::relu6_", "aten::relu6"),
            ("aten::relu_", "aten::relu"),
            ("aten::rsqrt_", "aten::rsqrt"),
            ("aten::rsub_", "aten::rsub"),
            ("aten::sigmoid_", "aten::sigmoid"),
            ("aten::silu_", "aten::silu"),
            ("aten::squeeze_", "aten::squeeze"),
            ("aten::sub_", "aten::sub"),
            ("aten::tanh_", "aten::tanh"),
            ("aten::unsqueeze_", "aten::unsqueeze"),
        ] {
            self.alias(inplace, canonical);
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry::new()
    }
}
