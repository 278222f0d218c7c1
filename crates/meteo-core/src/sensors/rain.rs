use embedded_hal::digital::InputPin;
use log::error;

use super::Indicatable;
use crate::error::SensorError;

/// Rain detector board with an active-low digital output.
pub struct RainSensor<P> {
    pin: P,
}

impl<P: InputPin> RainSensor<P> {
    pub fn new(pin: P) -> Self {
        Self { pin }
    }
}

impl<P: InputPin> Indicatable for RainSensor<P> {
    fn read(&mut self) -> Result<bool, SensorError> {
        self.pin.is_low().map_err(|e| {
            error!("Rain sensor pin read failed: {:?}", e);
            SensorError::Absent
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;
    use embedded_hal::digital::ErrorType;

    struct Pin(bool);

    impl ErrorType for Pin {
        type Error = Infallible;
    }

    impl InputPin for Pin {
        fn is_high(&mut self) -> Result<bool, Self::Error> {
            Ok(self.0)
        }

        fn is_low(&mut self) -> Result<bool, Self::Error> {
            Ok(!self.0)
        }
    }

    #[test]
    fn test_low_output_means_rain() {
        assert_eq!(RainSensor::new(Pin(false)).read(), Ok(true));
        assert_eq!(RainSensor::new(Pin(true)).read(), Ok(false));
    }
}
