//! Real Las Vegas / Henderson delivery addresses for realistic fixtures.
//!
//! Coordinates sourced from OpenStreetMap; postal codes follow USPS zones.

use route_optimizer::model::{Depot, Order, Priority, Vehicle};

/// A named delivery address with coordinates and postal code.
#[derive(Debug, Clone)]
pub struct Location {
    pub name: &'static str,
    pub street: &'static str,
    pub zip: &'static str,
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    pub const fn new(name: &'static str, street: &'static str, zip: &'static str, lat: f64, lng: f64) -> Self {
        Self {
            name,
            street,
            zip,
            lat,
            lng,
        }
    }

    pub fn address(&self) -> String {
        format!("{}, Las Vegas, NV {}", self.street, self.zip)
    }

    /// An order for this location with the coordinate already known.
    pub fn order(&self, id: &str, demand: f64) -> Order {
        Order::new(id, self.address(), demand)
            .with_coordinate(self.lat, self.lng)
            .with_postal_code(self.zip)
    }

    /// An order that still needs geocoding.
    pub fn unresolved_order(&self, id: &str, demand: f64) -> Order {
        Order::new(id, self.address(), demand)
    }
}

/// Central warehouse just off the Strip.
pub const WAREHOUSE: Depot = Depot::new(36.1023654, -115.1688720);

pub const STRIP: &[Location] = &[
    Location::new("Wynn Las Vegas", "3131 S Las Vegas Blvd", "89109", 36.1263781, -115.1658180),
    Location::new("Bellagio", "3600 S Las Vegas Blvd", "89109", 36.1126, -115.1767),
    Location::new("Caesars Palace", "3570 S Las Vegas Blvd", "89109", 36.1162, -115.1745),
    Location::new("Hard Rock Cafe", "3771 S Las Vegas Blvd", "89109", 36.1041592, -115.1722166),
    Location::new("Public House", "3355 S Las Vegas Blvd", "89109", 36.1219193, -115.1689317),
    Location::new("Brooklyn Bowl", "3545 S Las Vegas Blvd", "89109", 36.1175388, -115.1695094),
    Location::new("Gordon Ramsay BurGR", "3667 S Las Vegas Blvd", "89109", 36.1107195, -115.1720818),
    Location::new("Spago", "3600 S Las Vegas Blvd", "89109", 36.1139368, -115.1741462),
    Location::new("Grimaldi's Pizzeria", "3327 S Las Vegas Blvd", "89109", 36.1248850, -115.1683540),
    Location::new("Marakesh", "3900 Paradise Rd", "89169", 36.1177772, -115.1546882),
];

pub const SOUTH: &[Location] = &[
    Location::new("Bootlegger Bistro", "7700 S Las Vegas Blvd", "89123", 36.0492047, -115.1715744),
    Location::new("Denny's South", "7330 S Las Vegas Blvd", "89123", 36.0591086, -115.1717250),
    Location::new("Kabuki Japanese", "6593 S Las Vegas Blvd", "89119", 36.0675472, -115.1779391),
    Location::new("Mikos Izakaya", "9170 S Eastern Ave", "89123", 36.0429503, -115.1527627),
    Location::new("Budget Suites South", "9000 S Las Vegas Blvd", "89123", 36.0366259, -115.1713361),
    Location::new("Pei Wei Town Square", "6599 Las Vegas Blvd S", "89119", 36.0810469, -115.1472694),
];

pub const HENDERSON: &[Location] = &[
    Location::new("I Love Sushi", "11041 S Eastern Ave", "89052", 35.9916660, -115.1028343),
    Location::new("Islander's Grill", "2120 N Green Valley Pkwy", "89014", 36.0335058, -114.9856162),
    Location::new("Naga", "1500 W Warm Springs Rd", "89014", 36.0137634, -114.9928676),
    Location::new("RibCage", "10940 S Eastern Ave", "89052", 35.9949754, -115.0999810),
    Location::new("Green Valley Ranch", "2300 Paseo Verde Pkwy", "89052", 36.0308, -115.0825),
    Location::new("Sunset Station", "1301 W Sunset Rd", "89014", 36.0614, -115.0631),
];

pub const EAST: &[Location] = &[
    Location::new("Hello Tokyo", "5010 E Flamingo Rd", "89122", 36.1161627, -115.0902096),
    Location::new("Golden China", "5025 E Flamingo Rd", "89122", 36.1171166, -115.0904647),
    Location::new("Lindo Michoacan", "2655 E Desert Inn Rd", "89121", 36.1294005, -115.1135106),
    Location::new("Tomo Sushi", "4300 E Sunset Rd", "89120", 36.0992464, -115.1142123),
    Location::new("Wo Fat Chinese", "4610 E Charleston Blvd", "89104", 36.1298523, -115.0936239),
    Location::new("Chuck Wagon", "5111 Boulder Hwy", "89122", 36.1072491, -115.0593482),
    Location::new("Rivas Mexican Grill", "4300 E Charleston Blvd", "89110", 36.1450055, -115.0482587),
];

pub fn all_locations() -> Vec<Location> {
    let mut all = Vec::with_capacity(STRIP.len() + SOUTH.len() + HENDERSON.len() + EAST.len());
    all.extend_from_slice(STRIP);
    all.extend_from_slice(SOUTH);
    all.extend_from_slice(HENDERSON);
    all.extend_from_slice(EAST);
    all
}

/// One pre-geocoded order per location, demand cycling 1..=4, every fifth urgent.
pub fn metro_orders() -> Vec<Order> {
    all_locations()
        .iter()
        .enumerate()
        .map(|(index, location)| {
            let order = location.order(&format!("order-{index:02}"), (index % 4 + 1) as f64);
            if index % 5 == 0 {
                order.with_priority(Priority::Urgent)
            } else {
                order
            }
        })
        .collect()
}

/// `count` vans of the given capacity named `van-1`, `van-2`, ...
pub fn fleet(count: usize, capacity: f64) -> Vec<Vehicle> {
    (1..=count).map(|n| Vehicle::new(format!("van-{n}"), capacity)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinates_in_vegas_area() {
        for loc in all_locations() {
            assert!(loc.lat > 35.9 && loc.lat < 36.3, "{} lat out of range: {}", loc.name, loc.lat);
            assert!(loc.lng > -115.4 && loc.lng < -114.8, "{} lng out of range: {}", loc.name, loc.lng);
        }
    }
}
