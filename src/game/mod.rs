pub mod clock;
pub mod constants;
pub mod game_loop;
pub mod input_buffer;
pub mod match_result;
pub mod pool;
pub mod spatial;
pub mod state;
pub mod systems;
