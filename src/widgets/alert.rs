use hypertext::prelude::*;

pub struct ErrorAlert<S> {
    pub msg: S,
}

impl<S: ToString> Renderable for ErrorAlert<S> {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        maud!({
            div class="alert alert-danger" role="alert" {
                (self.msg.to_string())
            }
        })
        .render_to(buffer);
    }
}

/// Lists every problem found with a submitted form.
pub struct ErrorList<'r> {
    pub errors: &'r [String],
}

impl<'r> Renderable for ErrorList<'r> {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        maud!({
            div class="alert alert-danger" role="alert" {
                p class="mb-1" { "Please fix the following and try again:" }
                ul class="mb-0" {
                    @for error in self.errors {
                        li { (error) }
                    }
                }
            }
        })
        .render_to(buffer);
    }
}

pub struct SuccessAlert<S> {
    pub msg: S,
}

impl<S: ToString> Renderable for SuccessAlert<S> {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        maud!({
            div class="alert alert-success" role="alert" {
                (self.msg.to_string())
            }
        })
        .render_to(buffer);
    }
}
