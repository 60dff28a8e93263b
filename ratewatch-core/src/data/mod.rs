//! External collaborators.

pub mod provider;

pub use provider::{
    CalendarEvent, CalendarProvider, EventKind, InMemoryCalendar, InMemoryPositions,
    PositionProvider, TimeSeriesProvider,
};
