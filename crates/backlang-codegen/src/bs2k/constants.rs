//! Fixed memory map and machine constants of the Backseater 2k VM.
//!
//! These come from the machine definition and are never computed.

// Addresses

pub const ENTRY_POINT: u32 = 1_914_696;
pub const STACK_START: u32 = 1_390_408;

pub const FIRST_FRAMEBUFFER_START: u32 = 8_008;
pub const SECOND_FRAMEBUFFER_START: u32 = 699_208;

pub const TERMINAL_CURSOR_MODE: u32 = 8_004;
pub const TERMINAL_CURSOR_POINTER: u32 = 8_000;

pub const TERMINAL_BUFFER_START: u32 = 0;
pub const TERMINAL_BUFFER_END: u32 = 8_000;

// Constants

pub const TERMINAL_CURSOR_MODE_BLINKING: u32 = 0;
pub const TERMINAL_CURSOR_MODE_VISIBLE: u32 = 1;
pub const TERMINAL_CURSOR_MODE_INVISIBLE: u32 = 2;

pub const DISPLAY_WIDTH: u32 = 480;
pub const DISPLAY_HEIGHT: u32 = 360;

pub const TERMINAL_WIDTH: u32 = 80;
pub const TERMINAL_HEIGHT: u32 = 25;

pub const TERMINAL_BUFFER_SIZE: u32 = 8_000;
pub const FRAMEBUFFER_SIZE: u32 = 691_200;

pub const STACK_SIZE: u32 = 524_288;

/// General purpose registers R0..R255
pub const REGISTER_COUNT: u16 = 256;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_map_is_consistent() {
        assert_eq!(TERMINAL_BUFFER_END - TERMINAL_BUFFER_START, TERMINAL_BUFFER_SIZE);
        assert_eq!(TERMINAL_WIDTH * TERMINAL_HEIGHT * 4, TERMINAL_BUFFER_SIZE);
        assert_eq!(DISPLAY_WIDTH * DISPLAY_HEIGHT * 4, FRAMEBUFFER_SIZE);
        assert_eq!(SECOND_FRAMEBUFFER_START - FIRST_FRAMEBUFFER_START, FRAMEBUFFER_SIZE);
        assert_eq!(FIRST_FRAMEBUFFER_START + 2 * FRAMEBUFFER_SIZE, STACK_START);
        assert_eq!(STACK_START + STACK_SIZE, ENTRY_POINT);
    }
}
