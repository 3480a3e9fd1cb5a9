//! Physical quantities carried through a sample, values are never mixed across units

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

macro_rules! units {
    ($($name:ident => $fmt:literal),* $(,)?) => {
        $(
            #[derive(Debug, Copy, Clone, Default, Serialize, Deserialize, PartialOrd, PartialEq)]
            #[serde(transparent)]
            pub struct $name(pub f32);

            impl Display for $name {
                fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                    f.pad(&format!($fmt, self.0))
                }
            }
        )*
    };
}

units! {
    GForce => "{:.2}g",
    Dps => "{:.1}°/s",
    Microtesla => "{:.1}uT",
    Celsius => "{:.1}°C",
    Fahrenheit => "{:.0}°F",
    Afr => "{:.1}",
    Mph => "{:.1}mph",
    Feet => "{:.1}ft",
    Degrees => "{:.1}°",
    Psi => "{:.0}psi",
    InHg => "{:.1}inHg",
}
