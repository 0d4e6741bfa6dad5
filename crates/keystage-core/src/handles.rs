//! Typed handles for engine objects.

define_handle! {
    /// A MIDI or audio port registered with the engine.
    PortId
}

define_handle! {
    /// A MIDI route.
    MidiRouteId
}

define_handle! {
    /// An audio route.
    AudioRouteId
}

define_handle! {
    /// A synth program slot with pre-allocated render buffers.
    SynthId
}
