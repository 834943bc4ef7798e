pub mod config;
pub mod display;
pub mod effects;
pub mod error;
pub mod frame;
pub mod mapping;
pub mod mask;
pub mod params;
pub mod processing {
    pub mod backend;
    pub mod cpu;
    pub mod gpu;
    pub mod sampling;
}
pub mod session;
