mod context;
mod dump;
mod opcode;
mod types;
