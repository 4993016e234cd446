mod bind_push;
mod descriptor_set;
mod dynamic_state;
mod pipeline;
pub(super) mod render_pass;
mod static_state;
