mod code_buffer;
mod emit;
