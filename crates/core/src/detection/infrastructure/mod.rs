pub mod onnx_blazeface_probe;
