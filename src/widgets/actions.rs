use hypertext::prelude::*;

/// A row of links styled as buttons. The first link is the main action.
pub struct Actions<'r> {
    pub options: &'r [(&'r str, &'r str)],
}

impl<'r> Renderable for Actions<'r> {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        maud! {
            div class="d-flex flex-wrap gap-2 mt-3 mb-3" {
                @for (i, (link, text)) in self.options.iter().enumerate() {
                    a class=(if i == 0 { "btn btn-primary" } else { "btn btn-outline-secondary" })
                        href=(link) {
                        (text)
                    }
                }
            }
        }
        .render_to(buffer);
    }
}
