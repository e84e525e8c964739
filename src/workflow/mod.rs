pub mod render_ctx;
pub mod render_flow;

pub use render_ctx::RenderCtx;
pub use render_flow::RenderFlow;
