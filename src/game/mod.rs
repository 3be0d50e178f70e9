pub mod constants;
pub mod world;
pub mod scene;
pub mod registry;
pub mod profile;
pub mod projectile;
pub mod pool;
pub mod systems;
pub mod manager;
pub mod weapon;
pub mod runner;
