//! TUI pane rendering modules
//!
//! Each pane renders one part of the current [`Snapshot`]:
//!
//! - [`registers`]: general-purpose and segment registers, changed values highlighted
//! - [`backtrace`]: frame-pointer call chain with guessed arguments
//! - [`stack`]: raw words above the stack pointer
//! - [`maps`]: the tracee's memory mappings
//! - [`status`]: status bar with keybindings and tracee state
//!
//! Every pane takes `Option<&Snapshot>` and draws a placeholder when there is
//! none. Scroll offsets are owned by the app and clamped here.
//!
//! [`Snapshot`]: crate::snapshot::Snapshot

pub mod backtrace;
pub mod maps;
pub mod registers;
pub mod stack;
pub mod status;

pub use backtrace::render_backtrace_pane;
pub use maps::render_maps_pane;
pub use registers::render_registers_pane;
pub use stack::render_stack_pane;
pub use status::{render_status_bar, StatusRenderData};

use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    widgets::{Block, Borders, List, ListItem},
    Frame,
};

fn pane_block(title: &str, is_focused: bool) -> Block<'_> {
    let border_style = if is_focused {
        Style::default()
            .fg(DEFAULT_THEME.border_focused)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(DEFAULT_THEME.border_normal)
    };

    Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(border_style)
}

/// Clamp `offset` so the last page stays full; returns the clamped value
fn clamp_scroll(offset: usize, total_items: usize, visible_height: usize) -> usize {
    offset.min(total_items.saturating_sub(visible_height))
}

/// Render `items` as a bordered list starting at `*offset`
fn render_scrolled_list(
    frame: &mut Frame,
    area: Rect,
    block: Block,
    items: Vec<ListItem>,
    offset: &mut usize,
) {
    let visible_height = area.height.saturating_sub(2).max(1) as usize; // Account for borders, min 1
    *offset = clamp_scroll(*offset, items.len(), visible_height);

    let visible_items: Vec<ListItem> = items
        .into_iter()
        .skip(*offset)
        .take(visible_height)
        .collect();

    let list = List::new(visible_items).block(block);
    frame.render_widget(list, area);
}

fn placeholder(text: &str) -> ListItem<'_> {
    ListItem::new(text).style(Style::default().fg(DEFAULT_THEME.comment))
}
