use std::ops::{Index, IndexMut};

use strum::EnumCount;

use crate::arbiter::ArbiterCategory;

/// Physical constraint the throttler keeps the clock under.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumCount, strum::EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum Channel {
    /// Core rail power (W).
    Tdp,
    /// Core rail current, fast loop (A).
    FastTdc,
    /// Core rail current, slow loop (A).
    Tdc,
    /// Die temperature (°C).
    Thermal,
    /// Board input power (W).
    BoardPower,
    /// Hottest GDDR module temperature (°C).
    GddrThermal,
}

/// Safety range any limit for a channel is clamped into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimitRange {
    pub min: f32,
    pub max: f32,
}

/// Filter and PD tuning for one channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlParams {
    /// EMA weight of the newest sample, in `[0, 1]`. 1.0 disables smoothing.
    pub alpha: f32,
    pub p_gain: f32,
    pub d_gain: f32,
}

impl Channel {
    /// Every channel, in table order.
    pub const ALL: [Channel; Channel::COUNT] = [
        Channel::Tdp,
        Channel::FastTdc,
        Channel::Tdc,
        Channel::Thermal,
        Channel::BoardPower,
        Channel::GddrThermal,
    ];

    pub const fn limit_range(self) -> LimitRange {
        match self {
            Channel::Tdp => LimitRange {
                min: 50.0,
                max: 500.0,
            },
            Channel::FastTdc => LimitRange {
                min: 50.0,
                max: 500.0,
            },
            Channel::Tdc => LimitRange {
                min: 50.0,
                max: 400.0,
            },
            Channel::Thermal => LimitRange {
                min: 50.0,
                max: 100.0,
            },
            Channel::BoardPower => LimitRange {
                min: 50.0,
                max: 600.0,
            },
            Channel::GddrThermal => LimitRange {
                min: 50.0,
                max: 100.0,
            },
        }
    }

    pub const fn control_params(self) -> ControlParams {
        match self {
            Channel::Tdp => ControlParams {
                alpha: 1.0,
                p_gain: 0.2,
                d_gain: 0.0,
            },
            Channel::FastTdc => ControlParams {
                alpha: 1.0,
                p_gain: 0.5,
                d_gain: 0.0,
            },
            Channel::Tdc => ControlParams {
                alpha: 0.1,
                p_gain: 0.2,
                d_gain: 0.0,
            },
            Channel::Thermal => ControlParams {
                alpha: 1.0,
                p_gain: 0.2,
                d_gain: 0.0,
            },
            Channel::BoardPower => ControlParams {
                alpha: 1.0,
                p_gain: 0.1,
                d_gain: 0.1,
            },
            Channel::GddrThermal => ControlParams {
                alpha: 1.0,
                p_gain: 0.2,
                d_gain: 0.0,
            },
        }
    }

    /// The arbiter ceiling this channel drives.
    pub const fn arbiter_category(self) -> ArbiterCategory {
        match self {
            Channel::Tdp => ArbiterCategory::Tdp,
            Channel::FastTdc => ArbiterCategory::FastTdc,
            Channel::Tdc => ArbiterCategory::Tdc,
            Channel::Thermal => ArbiterCategory::Thermal,
            Channel::BoardPower => ArbiterCategory::BoardPower,
            Channel::GddrThermal => ArbiterCategory::GddrThermal,
        }
    }
}

/// One value per [`Channel`], indexed by the channel itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelTable<T>([T; Channel::COUNT]);

impl<T> ChannelTable<T> {
    pub fn from_fn(mut f: impl FnMut(Channel) -> T) -> Self {
        Self(std::array::from_fn(|i| f(Channel::ALL[i])))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Channel, &T)> {
        Channel::ALL.into_iter().zip(self.0.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Channel, &mut T)> {
        Channel::ALL.into_iter().zip(self.0.iter_mut())
    }

    pub fn map<U>(&self, mut f: impl FnMut(Channel, &T) -> U) -> ChannelTable<U> {
        ChannelTable::from_fn(|channel| f(channel, &self[channel]))
    }
}

impl<T: Default> Default for ChannelTable<T> {
    fn default() -> Self {
        Self::from_fn(|_| T::default())
    }
}

impl<T> Index<Channel> for ChannelTable<T> {
    type Output = T;

    fn index(&self, channel: Channel) -> &T {
        &self.0[channel as usize]
    }
}

impl<T> IndexMut<Channel> for ChannelTable<T> {
    fn index_mut(&mut self, channel: Channel) -> &mut T {
        &mut self.0[channel as usize]
    }
}
