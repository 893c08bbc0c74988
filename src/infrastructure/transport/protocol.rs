//! Pointer Report Protocol
//!
//! Wire formats for both transports and the static HID report descriptor.

use crate::domain::models::{ButtonMask, Event, PointerDelta, TransportKind};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// UDP port the desktop receiver listens on
pub const NETWORK_PORT: u16 = 5005;

/// Report id used for every HID input report
pub const HID_REPORT_ID: u8 = 0;

/// `[buttons, dx, dy]`
pub const HID_REPORT_LEN: usize = 3;

/// Largest magnitude the descriptor declares for a relative axis
pub const HID_AXIS_MAX: i32 = 127;

/// HID report descriptor for a 3-button relative mouse.
///
/// Must stay byte-for-byte stable: paired hosts cache it.
pub const MOUSE_REPORT_DESCRIPTOR: &[u8] = &[
    0x05, 0x01, // Usage Page (Generic Desktop)
    0x09, 0x02, // Usage (Mouse)
    0xA1, 0x01, // Collection (Application)
    0x09, 0x01, //   Usage (Pointer)
    0xA1, 0x00, //   Collection (Physical)
    0x05, 0x09, //     Usage Page (Buttons)
    0x19, 0x01, //     Usage Minimum (Button 1)
    0x29, 0x03, //     Usage Maximum (Button 3)
    0x15, 0x00, //     Logical Minimum (0)
    0x25, 0x01, //     Logical Maximum (1)
    0x95, 0x03, //     Report Count (3)
    0x75, 0x01, //     Report Size (1)
    0x81, 0x02, //     Input (Data, Variable, Absolute)
    0x95, 0x01, //     Report Count (1)
    0x75, 0x05, //     Report Size (5)
    0x81, 0x03, //     Input (Constant, Variable) - padding
    0x05, 0x01, //     Usage Page (Generic Desktop)
    0x09, 0x30, //     Usage (X)
    0x09, 0x31, //     Usage (Y)
    0x15, 0x81, //     Logical Minimum (-127)
    0x25, 0x7F, //     Logical Maximum (127)
    0x75, 0x08, //     Report Size (8)
    0x95, 0x02, //     Report Count (2)
    0x81, 0x06, //     Input (Data, Variable, Relative)
    0xC0, //   End Collection (Physical)
    0xC0, // End Collection (Application)
];

/// SDP subclass for a combo keyboard/pointing device
pub const SUBCLASS_COMBO: u8 = 0xC0;

/// SDP record the HID application registers with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdpSettings {
    pub name: String,
    pub description: String,
    pub provider: String,
    pub subclass: u8,
    pub descriptor: Vec<u8>,
}

impl Default for SdpSettings {
    fn default() -> Self {
        Self {
            name: "Hybrid Mouse".to_string(),
            description: "Pro".to_string(),
            provider: "Mouse".to_string(),
            subclass: SUBCLASS_COMBO,
            descriptor: MOUSE_REPORT_DESCRIPTOR.to_vec(),
        }
    }
}

/// Maps semantic events onto transport payloads
pub struct ReportEncoder;

impl ReportEncoder {
    /// Encode `event` for `kind`.
    ///
    /// `held` is the button state at the time of the event. HID is level based,
    /// so movement reports carry it to keep drags alive; the network text
    /// protocol ignores it.
    ///
    /// Returns `None` when the event has no representation on that transport
    /// (zero movement, or a release on the network transport).
    pub fn encode(event: &Event, kind: TransportKind, held: ButtonMask) -> Option<Vec<u8>> {
        let payload = match kind {
            TransportKind::Network => encode_network(event),
            TransportKind::Hid => encode_hid(event, held).map(|report| report.to_vec()),
        };
        if let Some(bytes) = &payload {
            trace!("Encoded {:?} for {}: {:02X?}", event, kind, bytes);
        }
        payload
    }
}

/// Network text grammar: `MOVE:<dx>,<dy>` | `CLICK:LEFT` | `CLICK:RIGHT`.
/// Only press edges are sent; the receiver treats each as a full click.
fn encode_network(event: &Event) -> Option<Vec<u8>> {
    match event {
        Event::Move(delta) if delta.is_zero() => None,
        Event::Move(delta) => Some(format!("MOVE:{},{}", delta.dx, delta.dy).into_bytes()),
        Event::Buttons(change) if change.pressed => {
            Some(format!("CLICK:{}", change.button).into_bytes())
        }
        Event::Buttons(_) => None,
    }
}

fn encode_hid(event: &Event, held: ButtonMask) -> Option<[u8; HID_REPORT_LEN]> {
    match event {
        Event::Move(delta) if delta.is_zero() => None,
        Event::Move(delta) => Some(hid_report(held, *delta)),
        Event::Buttons(change) => Some(hid_report(change.mask, PointerDelta::default())),
    }
}

/// Build a `[buttons, dx, dy]` input report. Axes are clamped, never wrapped.
pub fn hid_report(buttons: ButtonMask, delta: PointerDelta) -> [u8; HID_REPORT_LEN] {
    [
        buttons.bits() & 0x07,
        clamp_axis(delta.dx) as u8,
        clamp_axis(delta.dy) as u8,
    ]
}

fn clamp_axis(value: i32) -> i8 {
    value.clamp(-HID_AXIS_MAX, HID_AXIS_MAX) as i8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ButtonChange, ButtonId};

    /// Read a report back per the descriptor layout
    fn decode_hid(bytes: &[u8]) -> (u8, i32, i32) {
        assert_eq!(bytes.len(), HID_REPORT_LEN);
        (bytes[0] & 0x07, bytes[1] as i8 as i32, bytes[2] as i8 as i32)
    }

    fn press(button: ButtonId, mask: u8) -> Event {
        let mut m = ButtonMask::EMPTY;
        if mask & 0x01 != 0 {
            m = m.with(ButtonId::Left, true);
        }
        if mask & 0x02 != 0 {
            m = m.with(ButtonId::Right, true);
        }
        Event::Buttons(ButtonChange {
            button,
            pressed: m.contains(button),
            mask: m,
        })
    }

    #[test]
    fn test_network_move_text() {
        let bytes = ReportEncoder::encode(
            &Event::Move(PointerDelta::new(3, -4)),
            TransportKind::Network,
            ButtonMask::EMPTY,
        );
        assert_eq!(bytes.as_deref(), Some("MOVE:3,-4".as_bytes()));
    }

    #[test]
    fn test_network_clicks_on_press_only() {
        let left = ReportEncoder::encode(
            &press(ButtonId::Left, 0x01),
            TransportKind::Network,
            ButtonMask::EMPTY,
        );
        assert_eq!(left.as_deref(), Some("CLICK:LEFT".as_bytes()));

        let right = ReportEncoder::encode(
            &press(ButtonId::Right, 0x03),
            TransportKind::Network,
            ButtonMask::EMPTY,
        );
        assert_eq!(right.as_deref(), Some("CLICK:RIGHT".as_bytes()));

        let release = ReportEncoder::encode(
            &press(ButtonId::Left, 0x00),
            TransportKind::Network,
            ButtonMask::EMPTY,
        );
        assert_eq!(release, None);
    }

    #[test]
    fn test_zero_move_is_never_encoded() {
        for kind in [TransportKind::Network, TransportKind::Hid] {
            let bytes = ReportEncoder::encode(
                &Event::Move(PointerDelta::default()),
                kind,
                ButtonMask::EMPTY,
            );
            assert_eq!(bytes, None);
        }
    }

    #[test]
    fn test_hid_move_recovers_values_in_range() {
        for (dx, dy) in [(0, 5), (-127, 127), (127, -127), (-1, 1), (42, -99)] {
            let bytes = ReportEncoder::encode(
                &Event::Move(PointerDelta::new(dx, dy)),
                TransportKind::Hid,
                ButtonMask::EMPTY,
            )
            .unwrap();
            assert_eq!(decode_hid(&bytes), (0, dx, dy));
        }
    }

    #[test]
    fn test_hid_move_clamps_instead_of_wrapping() {
        let bytes = ReportEncoder::encode(
            &Event::Move(PointerDelta::new(300, -128)),
            TransportKind::Hid,
            ButtonMask::EMPTY,
        )
        .unwrap();
        assert_eq!(decode_hid(&bytes), (0, 127, -127));
    }

    #[test]
    fn test_hid_buttons_are_level_based() {
        let down = ReportEncoder::encode(
            &press(ButtonId::Right, 0x02),
            TransportKind::Hid,
            ButtonMask::EMPTY,
        )
        .unwrap();
        assert_eq!(down, vec![0x02, 0, 0]);

        let up = ReportEncoder::encode(
            &press(ButtonId::Right, 0x00),
            TransportKind::Hid,
            ButtonMask::EMPTY,
        )
        .unwrap();
        assert_eq!(up, vec![0x00, 0, 0]);
    }

    #[test]
    fn test_hid_move_carries_held_buttons() {
        let held = ButtonMask::EMPTY.with(ButtonId::Left, true);
        let bytes = ReportEncoder::encode(
            &Event::Move(PointerDelta::new(-6, 2)),
            TransportKind::Hid,
            held,
        )
        .unwrap();
        assert_eq!(decode_hid(&bytes), (0x01, -6, 2));
    }

    #[test]
    fn test_descriptor_layout() {
        assert_eq!(MOUSE_REPORT_DESCRIPTOR.len(), 50);
        assert_eq!(&MOUSE_REPORT_DESCRIPTOR[..4], &[0x05, 0x01, 0x09, 0x02]);
        assert_eq!(&MOUSE_REPORT_DESCRIPTOR[48..], &[0xC0, 0xC0]);
        assert_eq!(SdpSettings::default().subclass, 0xC0);
    }
}
