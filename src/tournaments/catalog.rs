//! Fixed reference data: Nepal's provinces and districts, and the sports a
//! tournament can be held for.

pub struct Province {
    pub id: u8,
    pub name: &'static str,
    pub districts: &'static [&'static str],
}

pub const NEPAL_PROVINCES: &[Province] = &[
    Province {
        id: 1,
        name: "Koshi Province",
        districts: &[
            "Bhojpur", "Dhankuta", "Ilam", "Jhapa", "Khotang", "Morang",
            "Okhaldhunga", "Panchthar", "Sankhuwasabha", "Solukhumbu",
            "Sunsari", "Taplejung", "Terhathum", "Udayapur",
        ],
    },
    Province {
        id: 2,
        name: "Madhesh Province",
        districts: &[
            "Bara", "Dhanusha", "Mahottari", "Parsa", "Rautahat", "Saptari",
            "Sarlahi", "Siraha",
        ],
    },
    Province {
        id: 3,
        name: "Bagmati Province",
        districts: &[
            "Bhaktapur", "Chitwan", "Dhading", "Dolakha", "Kathmandu",
            "Kavrepalanchok", "Lalitpur", "Makwanpur", "Nuwakot", "Ramechhap",
            "Rasuwa", "Sindhuli", "Sindhupalchok",
        ],
    },
    Province {
        id: 4,
        name: "Gandaki Province",
        districts: &[
            "Baglung", "Gorkha", "Kaski", "Lamjung", "Manang", "Mustang",
            "Myagdi", "Nawalpur", "Parbat", "Syangja", "Tanahun",
        ],
    },
    Province {
        id: 5,
        name: "Lumbini Province",
        districts: &[
            "Arghakhanchi", "Banke", "Bardiya", "Dang", "Gulmi", "Kapilvastu",
            "Parasi", "Palpa", "Pyuthan", "Rolpa", "Rukum East", "Rupandehi",
        ],
    },
    Province {
        id: 6,
        name: "Karnali Province",
        districts: &[
            "Dailekh", "Dolpa", "Humla", "Jajarkot", "Jumla", "Kalikot", "Mugu",
            "Rukum West", "Salyan", "Surkhet",
        ],
    },
    Province {
        id: 7,
        name: "Sudurpashchim Province",
        districts: &[
            "Achham", "Baitadi", "Bajhang", "Bajura", "Dadeldhura", "Darchula",
            "Doti", "Kailali", "Kanchanpur",
        ],
    },
];

pub const SPORTS_TYPES: &[&str] = &[
    "Football", "Cricket", "Basketball", "Volleyball", "Badminton", "Tennis",
    "Table Tennis", "Swimming", "Gym/Fitness", "Futsal", "Boxing", "Wrestling",
    "Archery", "Athletics", "Cycling", "Rock Climbing", "Martial Arts",
    "Hockey", "Rugby", "Baseball", "Softball", "Golf", "Bowling", "Skating",
    "Skiing", "Surfing", "Diving", "Gymnastics", "Weightlifting", "Crossfit",
    "Yoga", "Pilates", "Dance", "Aerobics", "Zumba", "Kickboxing", "Taekwondo",
    "Karate", "Judo", "Jiu-Jitsu", "Muay Thai", "Fencing", "Equestrian",
    // esports
    "Dota 2", "League of Legends", "Counter-Strike 2", "Valorant",
    "PUBG Mobile", "Mobile Legends", "Free Fire", "Call of Duty", "Fortnite",
    "Apex Legends", "Overwatch 2", "FIFA", "NBA 2K", "Rocket League",
    "Street Fighter", "Tekken", "Mortal Kombat", "Chess.com", "Clash Royale",
    "Clash of Clans", "Among Us", "Fall Guys", "Minecraft", "Roblox",
    "Genshin Impact",
];

/// Centre of Kathmandu, where the map starts when nothing else is known.
pub const KATHMANDU: (f64, f64) = (27.7172, 85.3240);

pub fn find_province(name: &str) -> Option<&'static Province> {
    NEPAL_PROVINCES.iter().find(|p| p.name == name)
}

pub fn is_valid_sport(sport: &str) -> bool {
    SPORTS_TYPES.contains(&sport)
}

pub fn is_valid_location(province: &str, district: &str) -> bool {
    find_province(province).is_some_and(|p| p.districts.contains(&district))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seven_provinces_and_seventy_seven_districts() {
        assert_eq!(NEPAL_PROVINCES.len(), 7);
        let districts: usize =
            NEPAL_PROVINCES.iter().map(|p| p.districts.len()).sum();
        assert_eq!(districts, 77);
    }

    #[test]
    fn districts_belong_to_their_province() {
        assert!(is_valid_location("Bagmati Province", "Kathmandu"));
        assert!(is_valid_location("Gandaki Province", "Kaski"));
        assert!(!is_valid_location("Gandaki Province", "Kathmandu"));
        assert!(!is_valid_location("Province 8", "Kathmandu"));
    }

    #[test]
    fn sports_are_case_sensitive() {
        assert!(is_valid_sport("Futsal"));
        assert!(!is_valid_sport("futsal"));
    }
}
